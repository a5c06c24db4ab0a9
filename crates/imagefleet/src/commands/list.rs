use colored::Colorize;
use std::path::Path;

pub fn handle(file: Option<&Path>) -> anyhow::Result<()> {
    let (_, graph) = super::load_graph(file)?;

    if graph.is_empty() {
        println!("{}", "イメージが定義されていません".yellow());
        return Ok(());
    }

    for (i, layer) in graph.topological_layers().iter().enumerate() {
        println!("{}", format!("段階 {}:", i + 1).bold());
        for name in layer {
            let Some(descriptor) = graph.get(name) else {
                continue;
            };
            println!("  - {}", name.cyan());
            if !descriptor.depends_on().is_empty() {
                println!("      依存: {}", descriptor.depends_on().join(", "));
            }
            for tag in descriptor.tags() {
                let marker = if descriptor.push() { " (push)" } else { "" };
                println!("      タグ: {}{}", tag, marker.dimmed());
            }
        }
    }

    Ok(())
}
