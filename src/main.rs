use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use mathval::ParseError;
use mathval::lex::{Lexer, TokenKind};
use miette::IntoDiagnostic;
use miette::WrapErr;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tokenize and parse exact arithmetic expressions")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the token stream, one token per line.
    Tokenize {
        #[command(flatten)]
        input: Input,
    },
    /// Print the syntax tree in prefix form.
    Parse {
        #[command(flatten)]
        input: Input,

        /// Print the expression reconstructed from the tree instead.
        #[arg(long)]
        source: bool,
    },
}

#[derive(clap::Args, Debug)]
struct Input {
    /// File holding the expression. Reads stdin when neither this nor `--expr` is given.
    filename: Option<PathBuf>,

    /// Expression text given inline.
    #[arg(short, long, conflicts_with = "filename")]
    expr: Option<String>,
}

impl Input {
    fn load(self) -> miette::Result<(String, String)> {
        if let Some(expr) = self.expr {
            return Ok(("<expr>".to_string(), expr));
        }
        match self.filename {
            Some(filename) => {
                let contents = fs::read_to_string(&filename)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;
                Ok((filename.display().to_string(), contents))
            }
            None => {
                let mut contents = String::new();
                io::stdin()
                    .read_to_string(&mut contents)
                    .into_diagnostic()
                    .wrap_err("reading stdin failed")?;
                Ok(("<stdin>".to_string(), contents))
            }
        }
    }
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::debug!("parsed CLI args = {:?}", args);

    match args.command {
        Commands::Tokenize { input } => {
            let (name, contents) = input.load()?;
            let mut lexer = Lexer::new(Some(&name), &contents);
            loop {
                let token = lexer.next_token();
                match token.kind {
                    TokenKind::Eof => break,
                    TokenKind::Illegal => {
                        let e = ParseError::illegal_character(lexer.named_source(), &token);
                        eprintln!(
                            "[line {}] Error: Unexpected character: {}",
                            e.line(),
                            token.literal
                        );
                        eprintln!("{:?}", miette::Report::new(e));

                        std::process::exit(65);
                    }
                    _ => println!("{token}"),
                }
            }
            println!("EOF");
        }
        Commands::Parse { input, source } => {
            let (name, contents) = input.load()?;
            let expression = match mathval::Parser::new(Some(&name), &contents).parse() {
                Ok(expression) => expression,
                Err(e) => {
                    eprintln!("[line {}] Error: {e}", e.line());
                    eprintln!("{:?}", miette::Report::new(e));

                    std::process::exit(65);
                }
            };
            if source {
                println!("{}", expression.to_source());
            } else {
                println!("{expression}");
            }
        }
    }
    Ok(())
}
