fn main() {
    let args = std::env::args().collect();
    match flotilla_cli::runner::main(args) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
