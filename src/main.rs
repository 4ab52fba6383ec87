mod args;
mod survey;

use std::io;
use std::path::Path;

use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use snafu::ErrorCompat;

use args::{Args, Command, SubmitArgs};
use survey::config_reader::*;
use survey::{SurveyError, SurveyResult};
use technostress_core::builder::FormBuilder;
use technostress_core::FormSubmission;

fn build_form(a: &SubmitArgs) -> SurveyResult<FormSubmission> {
    let form = FormBuilder::new(a.identity.as_deref().unwrap_or(""))
        .demographics(
            &a.gender,
            &a.age,
            &a.department,
            &a.mother_education,
            &a.father_education,
        )?
        .usage(
            &a.screen_time,
            &a.notification_count,
            &a.notification_type,
            &a.device,
        )?
        .scores(&a.scores)?
        .build()?;
    Ok(form)
}

fn run(args: &Args) -> SurveyResult<()> {
    let (config, config_dir) = match &args.config {
        Some(p) => {
            info!("Reading configuration {:?}", p);
            let dir = Path::new(p).parent().map(|d| d.to_path_buf());
            (read_config(p)?, dir)
        }
        None => (SurveyConfig::default(), None),
    };
    let settings = resolve_settings(
        &config,
        config_dir.as_deref(),
        args.store.as_deref(),
        std::env::var(ADMIN_PASSWORD_ENV).ok(),
    );
    debug!("settings: store {:?}", settings.store_path);

    match &args.command {
        Command::Questions => {
            survey::run_questions();
            Ok(())
        }
        Command::Submit(a) => {
            let capabilities = resolve_capabilities(
                &config,
                config_dir.as_deref(),
                std::env::var(MAIL_TOKEN_ENV).ok(),
            )?;
            let form = build_form(a)?;
            let stdin = io::stdin();
            let mut input = stdin.lock();
            let record = survey::run_submission(
                &settings,
                &capabilities,
                &form,
                a.email.as_deref(),
                &mut input,
            )?;
            println!("{}", survey::report::render_result(&record));
            Ok(())
        }
        Command::Report(a) => survey::run_report(
            &settings,
            a.password.as_deref().unwrap_or(""),
            a.records,
            a.out.clone(),
            a.reference.clone(),
        ),
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Err(e) = run(&args) {
        warn!("Error occured {:?}", e);
        eprintln!("Error: {}", e);
        if let SurveyError::Whatever {
            source: Some(inner),
            ..
        } = &e
        {
            eprintln!("Caused by: {}", inner);
        }
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            debug!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
