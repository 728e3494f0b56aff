use std::collections::HashMap;
use std::env;
use std::io::{self, Write};

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use env_logger::{self, Env};
use log::{error, info};
use tokio::runtime;
use tokio::signal;

use leakr_backup::snapshot::parse_timestamp;
use leakr_backup::{
    write_json, Config, Download, Error, Info, ResultExt, Stats, Status, Storage, Target, Upload,
};

const UPLOAD_COMMAND: &str = "upload";
const DOWNLOAD_COMMAND: &str = "download";
const FETCH_COMMAND: &str = "fetch";
const INFO_COMMAND: &str = "info";
const STATUS_COMMAND: &str = "status";
const STORAGE_ARG: &str = "storage";
const USER_ARG: &str = "user";
const ITERATION_ARG: &str = "iteration";
const TIMESTAMP_ARG: &str = "timestamp";
const OUTPUT_ARG: &str = "output";
const LOCAL_ARG: &str = "local";
const FILE_ARG: &str = "file";
const KEY_ARG: &str = "key";
const VERBOSE: &str = "verbose";
const STORAGE_URL_ENV: &str = "LEAKR_STORAGE_URL";

fn new_config(args: &ArgMatches<'_>) -> Result<Config, Error> {
    let mut env: HashMap<String, String> = env::vars().collect();
    if let Some(url) = args.value_of(STORAGE_ARG) {
        env.insert(STORAGE_URL_ENV.to_string(), url.to_string());
    }

    Config::from_env(&env)
}

fn init_logger(args: &ArgMatches<'_>) {
    let level = if args.is_present(VERBOSE) {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}

fn user_id<'a>(args: &'a ArgMatches<'_>) -> Result<&'a str, Error> {
    args.value_of(USER_ARG)
        .ok_or_else(|| Error::config("Missing --user"))
}

async fn run(args: &ArgMatches<'_>) -> Result<(), Error> {
    let cfg = new_config(args)?;
    let storage = Storage::new(&cfg)?;
    info!("{}", storage);

    if let Some(upload) = args.subcommand_matches(UPLOAD_COMMAND) {
        let iteration = upload.value_of(ITERATION_ARG).unwrap_or_default();
        let iteration = iteration
            .parse::<u64>()
            .map_err(|err| Error::config(format!("Invalid iteration '{}': {}", iteration, err)))?;
        let path = upload.value_of(FILE_ARG).unwrap_or_default();

        let mut command = Upload::new(&storage, user_id(upload)?, iteration, path);
        if let Some(timestamp) = upload.value_of(TIMESTAMP_ARG) {
            let timestamp = parse_timestamp(timestamp).map_err(|err| {
                Error::config(format!("Invalid timestamp '{}': {}", timestamp, err))
            })?;
            command.timestamp(timestamp);
        }

        let key = command.run().await?;
        println!("{}", key);
        return Ok(());
    }

    if let Some(download) = args.subcommand_matches(DOWNLOAD_COMMAND) {
        let target = Target::Latest {
            user_id: user_id(download)?.to_string(),
        };
        return download_to(&storage, target, download).await;
    }

    if let Some(fetch) = args.subcommand_matches(FETCH_COMMAND) {
        let key = fetch.value_of(KEY_ARG).unwrap_or_default();
        return download_to(&storage, Target::Key(key.to_string()), fetch).await;
    }

    if let Some(info) = args.subcommand_matches(INFO_COMMAND) {
        let candidates = Info::new(&storage, user_id(info)?).run().await?;

        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        write_json(&candidates, &mut stdout).io_err("<stdout>")?;
        writeln!(stdout).io_err("<stdout>")?;
        return Ok(());
    }

    if let Some(status) = args.subcommand_matches(STATUS_COMMAND) {
        let mut command = Status::new(&storage, user_id(status)?);
        if let Some(local) = status.value_of(LOCAL_ARG) {
            command.local(local);
        }

        let verdict = command.run().await?;
        println!("{}", verdict);
        return Ok(());
    }

    Ok(())
}

async fn download_to(storage: &Storage, target: Target, args: &ArgMatches<'_>) -> Result<(), Error> {
    let mut command = Download::new(storage, target);
    if let Some(output) = args.value_of(OUTPUT_ARG) {
        command.output(output);
    }

    let (key, path, _) = command.run().await?;
    println!("{}\t{}", key, path.display());
    Ok(())
}

fn block_on(args: &ArgMatches<'_>) -> Result<(), Error> {
    let rt = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .io_err("<runtime>")?;

    rt.block_on(async {
        tokio::select! {
            res = run(args) => res,
            _ = signal::ctrl_c() => Err(Error::cancelled()),
        }
    })
}

fn user_arg() -> Arg<'static, 'static> {
    Arg::with_name(USER_ARG)
        .long("user")
        .short("u")
        .value_name("id")
        .required(true)
        .help("Owner of the backups")
}

fn output_arg() -> Arg<'static, 'static> {
    Arg::with_name(OUTPUT_ARG)
        .long("output")
        .short("o")
        .value_name("file")
        .help("Write the snapshot to a specific file (default is the backup key)")
}

fn main() {
    dotenvy::dotenv().ok();

    let upload = SubCommand::with_name(UPLOAD_COMMAND)
        .about("Upload a local snapshot as a new backup")
        .arg(user_arg())
        .arg(
            Arg::with_name(ITERATION_ARG)
                .long("iteration")
                .short("i")
                .value_name("n")
                .required(true)
                .help("Save counter of the snapshot"),
        )
        .arg(
            Arg::with_name(TIMESTAMP_ARG)
                .long("timestamp")
                .short("t")
                .value_name("YYYY-MM-DD HH:MM:SS")
                .help("Backup time (default is the current UTC time)"),
        )
        .arg(
            Arg::with_name(FILE_ARG)
                .required(true)
                .help("Snapshot file to upload"),
        );

    let download = SubCommand::with_name(DOWNLOAD_COMMAND)
        .about("Download the latest backup of a user")
        .arg(user_arg())
        .arg(output_arg());

    let fetch = SubCommand::with_name(FETCH_COMMAND)
        .about("Download a backup by its exact key")
        .arg(Arg::with_name(KEY_ARG).required(true).help("Backup key"))
        .arg(output_arg());

    let info = SubCommand::with_name(INFO_COMMAND)
        .about("Print the latest backup candidates of a user as JSON")
        .arg(user_arg());

    let status = SubCommand::with_name(STATUS_COMMAND)
        .about("Compare a local snapshot with the latest remote backups")
        .arg(user_arg())
        .arg(
            Arg::with_name(LOCAL_ARG)
                .long("local")
                .short("l")
                .value_name("key")
                .help("Backup key of the local snapshot"),
        );

    let app = App::new("Leakr backup CLI")
        .bin_name("leakr-backup")
        .version("0.1")
        .setting(AppSettings::ColorAuto)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::StrictUtf8)
        .arg(
            Arg::with_name(STORAGE_ARG)
                .long("storage")
                .short("s")
                .value_name("url")
                .env(STORAGE_URL_ENV)
                .help("Storage location, 's3://bucket/prefix?region=..' or 'file:///path'")
                .global(true),
        )
        .arg(
            Arg::with_name(VERBOSE)
                .long("verbose")
                .short("v")
                .help("Enable debug output")
                .global(true),
        )
        .subcommand(upload)
        .subcommand(download)
        .subcommand(fetch)
        .subcommand(info)
        .subcommand(status)
        .get_matches();

    init_logger(&app);

    if let Err(err) = block_on(&app) {
        error!("{}", err);
        std::process::exit(1);
    } else {
        info!("{}", Stats::current());
    }
}
