use tracing::Level;
use xpress::cli::{self, OutputMode};
use xpress::printer::{JsonPrinter, LispPrinter};
use xpress::template::{Evaluator, Options};

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("xpress: {e}");
            eprintln!(
                "Usage: xpress [-d] [-t<ms>] [-a|-j] [-D name=value]... [-f <file> | <template>]"
            );
            std::process::exit(2);
        }
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.debug { Level::DEBUG } else { Level::WARN })
        .init();

    let src = match args.source.read() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("xpress: {e}");
            std::process::exit(1);
        }
    };

    let mut options = Options::default();
    if let Some(timeout) = args.timeout {
        options = options.with_timeout(timeout);
    }
    let evaluator = Evaluator::with_members(args.defines).with_options(options);
    let ast = evaluator.parse(&src);

    match args.output {
        OutputMode::Lisp => println!("{}", LispPrinter::print(&ast)),
        OutputMode::Json => match JsonPrinter::print(&ast) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("xpress: {e}");
                std::process::exit(1);
            }
        },
        OutputMode::Evaluate => match evaluator.evaluate(ast).await {
            Ok(value) => println!("{value}"),
            Err(e) => {
                eprintln!("xpress: {e}");
                std::process::exit(1);
            }
        },
    }
}
