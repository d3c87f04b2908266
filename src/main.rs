fn main() {
    let code = primoria_build::run_cli();
    if code != 0 {
        std::process::exit(code);
    }
}
