// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes them to a use case.
//
//   1. `train`   : trains the classifier and keeps the best
//                   dev-F1 checkpoint
//   2. `evaluate`: scores a saved checkpoint on one split
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "erc-train",
    version,
    about = "Train and evaluate a conversational emotion classifier."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on dialogues in: {}", args.data_dir);
    let checkpoint_dir = args.checkpoint_dir.clone();
    let report = TrainUseCase::new(args.into()).execute()?;

    for e in &report.epochs {
        let test_f1 = e.test_f1.map(|f| format!("{f:.4}")).unwrap_or_else(|| "-".to_string());
        println!(
            "epoch {:>3} | train_loss {:.4} | dev_acc {:.4} | dev_f1 {:.4} | test_f1 {}",
            e.epoch, e.train_loss, e.dev.accuracy, e.dev_f1, test_f1,
        );
    }
    println!("{} optimizer steps in total.", report.global_step);

    match report.epochs.iter().filter(|e| e.improved()).last() {
        Some(best) => println!(
            "Training complete. Best dev W-avg F1 {:.4} (epoch {}), checkpoint in '{}'.",
            report.best_dev_f1, best.epoch, checkpoint_dir
        ),
        None => println!("Training complete. Dev F1 never improved; no checkpoint written."),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let summary = EvaluateUseCase::new(args.checkpoint_dir, args.data_dir, args.split, args.device)
        .execute()?;

    println!(
        "{}: accuracy {:.4} | W-avg precision {:.4} recall {:.4} F1 {:.4} ({} examples)",
        summary.split.file_stem(),
        summary.outcome.accuracy,
        summary.scores.precision,
        summary.scores.recall,
        summary.scores.f1,
        summary.scores.support,
    );
    Ok(())
}
