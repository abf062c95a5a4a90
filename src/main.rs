use clap::Parser;
use medline_processor::cli::{args::Args, commands};
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    // Create async runtime and run the main command logic
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(commands::run(args));

    match result {
        Ok(_summaries) => {
            // Success - the per-batch table and final report were already printed
            process::exit(0);
        }
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("MEDLINE Processor - PubMed Citation Batch Converter");
    println!("===================================================");
    println!();
    println!("Normalize MEDLINE/PubMed citation XML batches into a relational staging");
    println!("schema and export them as CSV files or analytical-warehouse tables.");
    println!();
    println!("USAGE:");
    println!("    medline-processor <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    process     Normalize and export citation batches (main command)");
    println!("    help        Show this help message or help for specific commands");
    println!();
    println!("EXAMPLES:");
    println!("    # Process every XML batch in the configured source directory:");
    println!("    medline-processor process all");
    println!();
    println!("    # Process the first 5 batches:");
    println!("    medline-processor process 5");
    println!();
    println!("    # Process one named batch:");
    println!("    medline-processor process pubmed24n0012.xml");
    println!();
    println!("For detailed help, use:");
    println!("    medline-processor process --help");
}
