mod add;
mod cli;
mod config;
mod corpus;
mod delete;
mod extract;
mod generate;
mod import;
mod input;
mod logging;
mod rebuild;
mod search;
mod show;
mod stats;

use anyhow::Result;
use clap::Parser;

use opnote_core::SurgeonInputs;

use crate::cli::{Cli, Command};
use crate::config::OpnoteConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    let config = OpnoteConfig::from_env();
    match cli.command {
        Command::Add {
            file,
            text,
            procedure,
            specialty,
            name,
            keywords,
        } => add::run(
            &config,
            add::AddArgs {
                file,
                text,
                procedure,
                specialty,
                name,
                keywords,
            },
        ),
        Command::Import { dir } => import::run(&config, dir),
        Command::LoadCorpus {
            csv,
            specialties,
            limit,
        } => corpus::run(&config, csv, specialties, limit),
        Command::Search { query, top } => search::run(&config, query, top),
        Command::Show { id } => show::run(&config, id),
        Command::Delete { id } => delete::run(&config, id),
        Command::Rebuild => rebuild::run(&config),
        Command::Stats => stats::run(&config),
        Command::Generate {
            procedure,
            preop,
            postop,
            surgeon,
            assistant,
            anesthesia,
            indications,
            findings,
            details,
            specimens,
            drains,
            ebl,
            complications,
            context,
            max_context_chars,
            save,
        } => generate::run(
            &config,
            generate::GenerateArgs {
                inputs: SurgeonInputs {
                    procedure_type: procedure.clone(),
                    preop_diagnosis: preop,
                    postop_diagnosis: postop,
                    surgeon_name: surgeon,
                    assistant,
                    anesthesia_type: anesthesia,
                    indications,
                    findings,
                    procedure_details: details,
                    specimens,
                    drains,
                    ebl,
                    complications,
                },
                procedure,
                context,
                max_context_chars,
                save,
            },
        ),
        Command::Extract { file, text } => extract::run(&config, file, text),
    }
}
