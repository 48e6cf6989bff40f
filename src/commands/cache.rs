use super::utils::print_json;
use anyhow::Result;
use colored::Colorize;
use govm::Govm;
use govm::cache::format_size;

pub fn info(govm: &Govm, json: bool) -> Result<()> {
    let info = govm.cache_info()?;
    if json {
        return print_json(&info);
    }
    println!(
        "{} {}",
        "Download cache:".bold(),
        info.download_cache_path.display()
    );
    println!("  Archives   {}", format_size(info.download_cache_size));
    println!("  Total      {}", info.total_size_human);
    Ok(())
}

pub fn clean(govm: &Govm, all: bool) -> Result<()> {
    let cleaned = if all {
        govm.clean_all_cache()?
    } else {
        govm.clean_download_cache()?
    };

    if cleaned.removed == 0 {
        println!("Nothing to clean");
    } else {
        println!(
            "{} Removed {} file(s), freed {}",
            "✓".green(),
            cleaned.removed.to_string().bold(),
            format_size(cleaned.freed)
        );
    }
    Ok(())
}
