fn main() {
    funit::cli::run();
}
