fn main() -> anyhow::Result<()> {
    sel4_sdk_cli::run()
}
