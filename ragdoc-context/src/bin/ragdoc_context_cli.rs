use clap::{Parser, ValueEnum};
use ragdoc_context::budget::{ContextBudgeter, DEFAULT_TOKENS_PER_WORD};
use ragdoc_context::prompt::assemble;
use std::fs;
use std::io::{self, Read};

/// Budget a JSON array of passages into a prompt using ragdoc-context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON file holding an array of passage strings. Reads stdin if omitted.
    #[arg(short, long)]
    input: Option<String>,

    /// Question to place in the prompt.
    #[arg(short, long, default_value = "")]
    question: String,

    /// Model context window in tokens.
    #[arg(long, default_value_t = 4096)]
    context_window: usize,

    /// Tokens reserved for the generated answer.
    #[arg(long, default_value_t = 500)]
    reserved: usize,

    /// Approximate tokens per word.
    #[arg(long, default_value_t = DEFAULT_TOKENS_PER_WORD)]
    tokens_per_word: f64,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Prompt)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Prompt,
    Json,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let raw = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let passages: Vec<String> = serde_json::from_str(&raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let budgeter = ContextBudgeter::new(args.context_window, args.reserved, args.tokens_per_word);
    let assembled = assemble(&budgeter, &passages, &args.question);

    match args.format {
        OutputFormat::Prompt => println!("{}", assembled.prompt),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&assembled)?),
    }

    Ok(())
}
