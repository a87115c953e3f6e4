fn main() -> Result<(), Box<dyn std::error::Error>> {
    mcpchat::cli::main()
}
