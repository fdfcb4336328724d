fn main() -> Result<(), Box<dyn std::error::Error>> {
    assay_cli::runner::main(std::env::args().collect())
}
