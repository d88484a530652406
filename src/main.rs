use clap::Parser;
use miette::Result;
use tracing_subscriber::EnvFilter;

use cadventory::cli::commands;
use cadventory::cli::{Cli, Commands, GlobalOpts};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_logging(&global);

    match cli.command {
        Commands::Init(args) => commands::init::run(args, &global),
        Commands::Index(args) => commands::index::run(args, &global),
        Commands::Status(args) => commands::status::run(args, &global),
        Commands::List(args) => commands::list::run(args, &global),
        Commands::Show(args) => commands::show::run(args, &global),
        Commands::Search(args) => commands::search::run(args, &global),
        Commands::Tag(cmd) => commands::tag::run(cmd, &global),
        Commands::Include(args) => commands::include::run_include(args, &global),
        Commands::Exclude(args) => commands::include::run_exclude(args, &global),
        Commands::Select(args) => commands::select::run_select(args, &global),
        Commands::Deselect(args) => commands::select::run_deselect(args, &global),
        Commands::Set(args) => commands::set::run(args, &global),
        Commands::Report(args) => commands::report::run(args, &global),
        Commands::Reset(args) => commands::reset::run(args, &global),
        Commands::Config(cmd) => commands::config::run(cmd, &global),
        Commands::Completions(args) => commands::completions::run(args),
    }
}

/// Logs go to stderr; `CADVENTORY_LOG` overrides the level chosen by flags
fn init_logging(global: &GlobalOpts) {
    let fallback = if global.verbose { "cadventory=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("CADVENTORY_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
