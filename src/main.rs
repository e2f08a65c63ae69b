fn main() {
    rps_stages_lib::run()
}
