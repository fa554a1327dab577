use std::{error::Error, io, process::ExitCode};

use attention_viz::{
    cli::AttnvizArgs,
    render::{Headless, Presenter, SystemViewer},
    run::run_from_path,
};
use ortho_config::OrthoConfig;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = AttnvizArgs::load()?;
    let presenter: Box<dyn Presenter> = if args.show {
        Box::new(SystemViewer::new())
    } else {
        Box::new(Headless)
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_from_path(
        args.config_file(),
        args.output_dir.as_deref(),
        presenter.as_ref(),
        &mut out,
    )?;
    Ok(())
}
