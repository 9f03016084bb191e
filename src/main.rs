fn main() -> anyhow::Result<()> {
    smol::block_on(nagato::run())
}
