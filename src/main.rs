fn main() {
    std::process::exit(htq::cli::run());
}
