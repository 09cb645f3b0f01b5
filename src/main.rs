fn main() -> anyhow::Result<()> {
    timespent_lib::run()
}
