fn main() -> Result<(), Box<dyn std::error::Error>> {
    arcdesk::cli::main()
}
