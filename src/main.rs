fn main() {
    if let Err(err) = dot_scene::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
