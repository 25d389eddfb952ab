mod check;
mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Check(args)) => check::run_check(&cli.run, args.frames),
        Some(Command::Where) => run_where(&cli.run),
        None => run::run(&cli.run),
    }
}

fn run_where(args: &cli::RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let settings = run::resolve(args, &paths)?;

    println!("Configuration:");
    println!("  config dir:  {}", paths.config_dir().display());
    println!(
        "  config file: {} ({})",
        settings.config_file.display(),
        if settings.config_found {
            "found"
        } else {
            "missing, using defaults"
        }
    );
    println!("Shaders:");
    println!("  vertex:      {}", settings.vertex_origin);
    println!("  fragment:    {}", settings.fragment_origin);
    println!("Textures:");
    println!(
        "  root:        {}",
        settings.renderer.texture_root.display()
    );
    for (body, source) in settings.renderer.textures.iter() {
        println!("  {:<12} {source}", format!("{body}:"));
    }
    Ok(())
}
