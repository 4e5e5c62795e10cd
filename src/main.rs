mod cli;
mod commands;
mod env_loader;
mod error;
mod logging;
mod processing;
mod source;
mod stub;

fn main() {
    env_loader::load_dotenv();

    match cli::run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}
