// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        command::{self, BuildDepCommand, Demands, InputKind},
        config::{parse_define, BuildDepConfig},
        error::{BuildDepError, Result},
        keyring::Keyring,
        repository::reader_from_str,
        sack::PackageSack,
    },
    clap::{Arg, ArgMatches, Command},
    log::{debug, info, LevelFilter},
    std::io::Write,
};

const BUILDDEP_ABOUT: &str = "\
Install the build dependencies of source packages and spec files.

Each PACKAGE is a path. Paths ending in .src.rpm or .nosrc.rpm are read as
source packages. Anything else is read as a spec file. Use --spec or --srpm
to override this.

Every build requirement is resolved against the packages advertised by the
enabled repositories. The packages that would be installed are printed.
Requirements nothing satisfies are reported and the command fails after all
requirements of the input have been tried.
";

/// Construct the command line parser.
pub fn command() -> Command<'static> {
    let app = Command::new("rpm-builddep")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Resolve the build dependencies of RPM source packages")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .takes_value(true)
                .global(true)
                .help("YAML configuration file"),
        )
        .arg(
            Arg::new("repo")
                .long("repo")
                .takes_value(true)
                .multiple_occurrences(true)
                .number_of_values(1)
                .global(true)
                .help("URL or path of an additional repository"),
        )
        .arg(
            Arg::new("keyring")
                .long("keyring")
                .takes_value(true)
                .multiple_occurrences(true)
                .number_of_values(1)
                .global(true)
                .help("Directory holding trusted public keys. Replaces configured directories"),
        )
        .arg(
            Arg::new("nogpgcheck")
                .long("nogpgcheck")
                .global(true)
                .help("Don't verify signatures of source packages"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    app.subcommand(
        Command::new(command::ALIASES[0])
            .about(command::SUMMARY)
            .long_about(BUILDDEP_ABOUT)
            .override_usage(command::USAGE)
            .arg(
                Arg::new("define")
                    .short('D')
                    .long("define")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .number_of_values(1)
                    .value_name("'NAME VALUE'")
                    .help("Define a macro for spec file parsing"),
            )
            .arg(
                Arg::new("spec")
                    .long("spec")
                    .conflicts_with("srpm")
                    .help("Treat arguments as spec files"),
            )
            .arg(
                Arg::new("srpm")
                    .long("srpm")
                    .help("Treat arguments as source packages"),
            )
            .arg(
                Arg::new("packages")
                    .value_name("PACKAGE")
                    .required(true)
                    .multiple_values(true)
                    .help("Source packages or spec files"),
            ),
    )
}

fn init_logging(matches: &ArgMatches) {
    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    // Nerf TLS chatter unless asked for.
    if log_level < LevelFilter::Trace {
        builder.filter_module("rustls", LevelFilter::Error);
    }

    builder.init();
}

/// Resolve the effective configuration from a config file and command line overrides.
fn load_config(args: &ArgMatches) -> Result<BuildDepConfig> {
    let mut config = if let Some(path) = args.value_of("config") {
        BuildDepConfig::from_path(path)?
    } else {
        BuildDepConfig::default()
    };

    if let Some(urls) = args.values_of("repo") {
        for url in urls {
            config.add_repository_url(url);
        }
    }

    if let Some(dirs) = args.values_of("keyring") {
        config.keyring_dirs = dirs.map(|s| s.to_string()).collect();
    }

    if args.is_present("nogpgcheck") {
        config.gpgcheck = false;
    }

    Ok(config)
}

fn load_keyring(config: &BuildDepConfig) -> Result<Keyring> {
    let mut keyring = Keyring::new();

    for dir in &config.keyring_dirs {
        let count = keyring.load_dir(dir)?;
        debug!("loaded {} keys from {}", count, dir);
    }

    Ok(keyring)
}

fn load_sack(config: &BuildDepConfig) -> Result<PackageSack> {
    let runtime = tokio::runtime::Runtime::new()?;
    let mut sack = PackageSack::new();

    for repo in config.enabled_repositories() {
        let reader = reader_from_str(&repo.url)?;
        runtime.block_on(sack.load_repository(&repo.name, reader.as_ref()))?;
    }

    info!("{} packages available", sack.len());

    Ok(sack)
}

fn command_builddep(args: &ArgMatches, out: &mut dyn Write) -> Result<()> {
    let config = load_config(args)?;

    let mut builddep = BuildDepCommand::new(load_keyring(&config)?);
    builddep.set_nogpgcheck(!config.gpgcheck);

    if args.is_present("spec") {
        builddep.set_forced_kind(Some(InputKind::Spec));
    } else if args.is_present("srpm") {
        builddep.set_forced_kind(Some(InputKind::SourcePackage));
    }

    for (name, value) in &config.defines {
        builddep.macros_mut().define(name, value);
    }
    if let Some(defines) = args.values_of("define") {
        for define in defines {
            let (name, value) = parse_define(define)?;
            builddep.macros_mut().define(name, value);
        }
    }

    let mut demands = Demands::default();
    builddep.configure(&mut demands);

    if demands.root_user {
        debug!("{} changes the system; privileges are not checked", command::ALIASES[0]);
    }

    let mut sack = if demands.sack_activation && demands.available_repos {
        load_sack(&config)?
    } else {
        PackageSack::new()
    };

    let packages = args
        .values_of("packages")
        .map(|values| values.map(|s| s.to_string()).collect::<Vec<_>>())
        .unwrap_or_default();

    builddep.run(&packages, &mut sack)?;

    if demands.resolving {
        write!(out, "{}", sack.goal())?;
    }

    Ok(())
}

/// Run a parsed command line, writing results to `out`.
pub fn dispatch(matches: &ArgMatches, out: &mut dyn Write) -> Result<()> {
    match matches.subcommand() {
        Some(("builddep", args)) => command_builddep(args, out),
        Some((command, _)) => Err(BuildDepError::InvalidSubCommand(command.to_string())),
        None => Err(BuildDepError::InvalidSubCommand(String::new())),
    }
}

pub fn run_cli() -> Result<()> {
    let matches = command().get_matches();

    init_logging(&matches);

    dispatch(&matches, &mut std::io::stdout())
}
