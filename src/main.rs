use pipeline_shell::config::Args;
use pipeline_shell::{Config, Interpreter};
use tracing_subscriber::EnvFilter;

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    init_logging(&args.log_level);

    let mut sh = Interpreter::new(Config::from(&args));
    let code = match &args.command {
        Some(line) => sh.run_line(line),
        None => sh.repl()?,
    };
    std::process::exit(code)
}
