fn main() -> anyhow::Result<()> {
    matswap::viewer::run("MaterialChange.gltf")
}
