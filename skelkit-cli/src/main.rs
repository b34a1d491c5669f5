use clap::{Args as ClapArgs, Parser, Subcommand};
use skelkit_cli::{DocumentArgs, RewriteArgs, debug, run_rewrite_command, view};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log filter progress and recoverable problems
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

/// Input options shared by all subcommands.
#[derive(ClapArgs, Debug)]
struct Input {
    /// The input file to process
    #[arg(short, long)]
    input: String,

    /// Source locale of the document
    #[arg(long, default_value = "en")]
    source: String,

    /// Target locale (required for TMX)
    #[arg(long)]
    target: Option<String>,

    /// Document format (tmx or xml); inferred from the extension by default
    #[arg(long)]
    format: Option<String>,
}

impl From<Input> for DocumentArgs {
    fn from(input: Input) -> Self {
        DocumentArgs {
            input: input.input,
            source: input.source,
            target: input.target,
            format: input.format,
        }
    }
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the text units of a document.
    View {
        #[command(flatten)]
        input: Input,

        /// Display full text without truncation
        #[arg(long)]
        full: bool,
    },

    /// Dump the event stream of a document as JSON.
    Debug {
        #[command(flatten)]
        input: Input,

        /// Write the JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Write a document back out, optionally translated or re-encoded.
    Rewrite {
        #[command(flatten)]
        input: Input,

        /// The output file to write the results to
        #[arg(short, long)]
        output: String,

        /// JSON object mapping unit names or ids to translations
        #[arg(long)]
        translations: Option<String>,

        /// Locale whose text is written for monolingual documents
        #[arg(long)]
        output_locale: Option<String>,

        /// Encoding of the output, instead of the input's
        #[arg(long)]
        output_encoding: Option<String>,
    },
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let result = match args.commands {
        Commands::View { input, full } => view::print_view(&input.into(), full),
        Commands::Debug { input, output } => debug::run_debug_command(&input.into(), output),
        Commands::Rewrite {
            input,
            output,
            translations,
            output_locale,
            output_encoding,
        } => run_rewrite_command(&RewriteArgs {
            document: input.into(),
            output,
            translations,
            output_locale,
            output_encoding,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
