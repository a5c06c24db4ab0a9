pub mod build;
pub mod list;
pub mod validate;

use anyhow::Context;
use imagefleet_config::LoadedManifest;
use imagefleet_core::{DependencyGraph, ImageDescriptor};
use std::path::Path;

/// マニフェストを読み込み、イメージ定義に変換
pub fn load_descriptors(file: Option<&Path>) -> anyhow::Result<(LoadedManifest, Vec<ImageDescriptor>)> {
    let loaded = imagefleet_config::load_manifest(file)?;
    let descriptors = loaded
        .manifest
        .to_descriptors(&loaded.base_dir)
        .with_context(|| format!("マニフェストの変換に失敗しました: {}", loaded.path.display()))?;
    Ok((loaded, descriptors))
}

/// マニフェストから依存グラフを構築
pub fn load_graph(file: Option<&Path>) -> anyhow::Result<(LoadedManifest, DependencyGraph)> {
    let (loaded, descriptors) = load_descriptors(file)?;
    let graph = DependencyGraph::build(descriptors)?;
    Ok((loaded, graph))
}
