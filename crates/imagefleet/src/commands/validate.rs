use colored::Colorize;
use std::path::Path;

pub fn handle(file: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "マニフェストを検証中...".blue());

    match super::load_graph(file) {
        Ok((loaded, graph)) => {
            println!(
                "マニフェスト: {}",
                loaded.path.display().to_string().cyan()
            );
            println!("{}", "✓ マニフェストは正常です！".green().bold());
            println!();
            println!("サマリー:");
            println!("  イメージ: {}個", graph.len());
            println!("  ビルド段数: {}", graph.topological_layers().len());
            let pushed = graph.descriptors().filter(|d| d.push()).count();
            if pushed > 0 {
                println!("  プッシュ対象: {}個", pushed);
            }
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ マニフェストエラー".red().bold());
            for cause in e.chain() {
                eprintln!("  {}", cause);
            }
            std::process::exit(1);
        }
    }

    Ok(())
}
