use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    spacechat::cli::main()
}
