// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of inkpot.
//
// inkpot is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// inkpot is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with inkpot.  If not,
// see <http://www.gnu.org/licenses/>.

//! # inkpot-admin
//!
//! Administrative chores against an inkpot DynamoDB database:
//!
//! - `create-schema`: create the inkpot tables
//! - `add-user`: add a user (& their blog) without going through the API
//! - `generate-test-data`: charge the database with random users, posts, likes & reads
//!
//! Users added here have their passwords peppered, so `add-user` needs the same peppers `inkpotd`
//! uses; give it `inkpotd`'s configuration file & it will take them from there.

use std::{io, path::PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command, crate_authors, crate_version, value_parser};
use rand::{SeedableRng, rngs::StdRng};
use secrecy::SecretString;
use serde::Deserialize;
use snafu::{IntoError, prelude::*};
use tracing::{Level, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self},
    layer::SubscriberExt,
};

use inkpot::{
    dynamodb::{self, Location},
    dynamodb_schemas::create_schema,
    entities::{Blog, User},
    peppers::Peppers,
    storage::Backend,
    test_data::generate_test_data,
    util::Credentials,
};
use inkpot_shared::{UserEmail, Username};

/// Application error type
#[derive(Snafu)]
pub enum Error {
    #[snafu(display("Failed to add user {username}: {source}"))]
    AddUser {
        username: String,
        source: inkpot::storage::Error,
    },
    #[snafu(display("Unable to read configuration file {pth:?}: {source}"))]
    ConfigNotFound {
        pth: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Error parsing configuration file {pth:?}: {source}"))]
    ConfigParse {
        pth: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("Failed to connect to DynamoDB: {source}"))]
    Dynamo { source: dynamodb::Error },
    #[snafu(display("Failed to parse RUST_LOG: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("Invalid {what}: {source}"))]
    Field {
        what: String,
        source: inkpot_shared::Error,
    },
    #[snafu(display("{peppers} contains no peppers: {source}"))]
    NoPepper {
        peppers: String,
        source: inkpot::peppers::Error,
    },
    #[snafu(display("Failed to create the schema: {source}"))]
    Schema {
        source: inkpot::dynamodb_schemas::Error,
    },
    #[snafu(display("Failed to set the tracing subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
    #[snafu(display("Failed to generate test data: {source}"))]
    TestData { source: inkpot::test_data::Error },
    #[snafu(display("Couldn't create user {username}: {source}"))]
    User {
        username: String,
        source: inkpot::entities::Error,
    },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

type Result<T> = std::result::Result<T, Error>;

/// The only part of `inkpotd`'s configuration we need
#[derive(Deserialize)]
struct PepperConfig {
    pepper: Option<Peppers>,
}

/// Read the peppers out of the `inkpotd` configuration at `pth`
///
/// With no configuration we make up a pepper; that's fine for test data nobody will log in as.
fn peppers(pth: Option<&PathBuf>) -> Result<Peppers> {
    match pth {
        Some(pth) => {
            let text = std::fs::read_to_string(pth)
                .map_err(|err| ConfigNotFoundSnafu { pth: pth.clone() }.into_error(err))?;
            let cfg = toml::from_str::<PepperConfig>(&text)
                .map_err(|err| ConfigParseSnafu { pth: pth.clone() }.into_error(err))?;
            match cfg.pepper {
                Some(peppers) => Ok(peppers),
                None => {
                    warn!("{:?} configures no pepper; using a random one", pth);
                    Ok(Peppers::default())
                }
            }
        }
        None => {
            warn!("No configuration given; using a random pepper");
            Ok(Peppers::default())
        }
    }
}

async fn storage(matches: &ArgMatches) -> Result<dynamodb::Client> {
    let location = matches
        .get_one::<Location>("location")
        .cloned()
        .unwrap_or_default();
    dynamodb::Client::new(&location, matches.get_one::<Credentials>("creds"))
        .await
        .context(DynamoSnafu)
}

async fn add_user(matches: &ArgMatches) -> Result<()> {
    let username = matches
        .get_one::<String>("username")
        .cloned()
        .unwrap_or_default();
    let email = matches
        .get_one::<String>("email")
        .cloned()
        .unwrap_or_default();
    let password = SecretString::from(
        matches
            .get_one::<String>("password")
            .cloned()
            .unwrap_or_default(),
    );

    let name = Username::new(&username).context(FieldSnafu { what: "username" })?;
    let email = UserEmail::new(&email).context(FieldSnafu { what: "e-mail" })?;
    let peppers = peppers(matches.get_one::<PathBuf>("config"))?;
    let (version, pepper) = peppers.current_pepper().context(NoPepperSnafu {
        peppers: "The configuration",
    })?;
    let user = User::new(&version, &pepper, &name, &password, &email).context(UserSnafu {
        username: username.clone(),
    })?;

    let client = storage(matches).await?;
    client.add_user(&user).await.context(AddUserSnafu {
        username: username.clone(),
    })?;
    client
        .add_blog(&Blog::new(&user))
        .await
        .context(AddUserSnafu {
            username: username.clone(),
        })?;
    info!("Added user {} ({})", username, user.id());
    Ok(())
}

async fn test_data(matches: &ArgMatches) -> Result<()> {
    let num_users = matches.get_one::<usize>("users").copied().unwrap_or(10);
    let mut rng = match matches.get_one::<u64>("seed") {
        Some(seed) => StdRng::seed_from_u64(*seed),
        None => StdRng::from_entropy(),
    };
    let password = SecretString::from(
        matches
            .get_one::<String>("password")
            .cloned()
            .unwrap_or_default(),
    );
    let peppers = peppers(matches.get_one::<PathBuf>("config"))?;
    let client = storage(matches).await?;
    let summary = generate_test_data(&client, &peppers, &password, num_users, &mut rng)
        .await
        .context(TestDataSnafu)?;
    info!(
        "Generated {} users, {} posts, {} likes & {} reads",
        summary.users, summary.posts, summary.likes, summary.reads
    );
    Ok(())
}

fn configure_logging(matches: &ArgMatches) -> Result<()> {
    let level = match (
        matches.get_flag("debug"),
        matches.get_flag("verbose"),
        matches.get_flag("quiet"),
    ) {
        (true, _, _) => Level::TRACE,
        (false, true, _) => Level::DEBUG,
        (false, false, true) => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()
        .context(EnvFilterSnafu)?;
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = if matches.get_flag("plain") {
        Box::new(fmt::Layer::default().compact().with_writer(io::stdout))
    } else {
        Box::new(fmt::Layer::default().json().with_writer(io::stdout))
    };
    tracing::subscriber::set_global_default(Registry::default().with(formatter).with(filter))
        .context(SubscriberSnafu)
}

/// Arguments locating the database, common to every sub-command
fn database_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("creds")
            .short('c')
            .long("creds")
            .num_args(1)
            .env("INKPOT_ADMIN_CREDS")
            .value_parser(value_parser!(Credentials))
            .help("AWS credentials, as \"key-id,secret\""),
    )
    .arg(
        Arg::new("location")
            .short('l')
            .long("location")
            .num_args(1)
            .value_parser(value_parser!(Location))
            .env("INKPOT_ADMIN_LOCATION")
            .help("Network location of DynamoDB")
            .long_help(
                "Network location of DynamoDB.

Specify as either an AWS region ('us-west-2', e.g.) or as one or more comma-separated URLs
('http://localhost:8000', e.g.)",
            ),
    )
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .num_args(1)
        .value_parser(value_parser!(PathBuf))
        .env("INKPOT_CONFIG")
        .help("the inkpotd configuration file, from which peppers will be read")
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("inkpot-admin")
        .version(crate_version!())
        .author(crate_authors!())
        .about("inkpot administration")
        .long_about("Create the inkpot DynamoDB schema, add users & generate test data.")
        .subcommand_required(true)
        .arg(
            Arg::new("debug")
                .short('D')
                .long("debug")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("INKPOT_ADMIN_DEBUG")
                .help("produce debug output"),
        )
        .arg(
            Arg::new("plain")
                .short('p')
                .long("plain")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("INKPOT_ADMIN_PLAIN")
                .help("log in human-readable format, not JSON/structured logging"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("INKPOT_ADMIN_QUIET")
                .help("produce only error output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .env("INKPOT_ADMIN_VERBOSE")
                .help("produce prolix output"),
        )
        .subcommand(database_args(
            Command::new("create-schema").about("Create the inkpot tables"),
        ))
        .subcommand(database_args(
            Command::new("add-user")
                .about("Add a user, along with their blog")
                .arg(config_arg())
                .arg(
                    Arg::new("password")
                        .short('P')
                        .long("password")
                        .num_args(1)
                        .required(true)
                        .env("INKPOT_ADMIN_PASSWORD")
                        .help("the new user's password"),
                )
                .arg(Arg::new("username").index(1).required(true))
                .arg(Arg::new("email").index(2).required(true)),
        ))
        .subcommand(database_args(
            Command::new("generate-test-data")
                .about("Charge the database with random users, posts, likes & reads")
                .arg(config_arg())
                .arg(
                    Arg::new("users")
                        .short('u')
                        .long("users")
                        .num_args(1)
                        .default_value("10")
                        .value_parser(value_parser!(usize))
                        .help("number of users to create"),
                )
                .arg(
                    Arg::new("password")
                        .short('P')
                        .long("password")
                        .num_args(1)
                        .default_value("inkpot test password")
                        .env("INKPOT_ADMIN_PASSWORD")
                        .help("password given to every generated user"),
                )
                .arg(
                    Arg::new("seed")
                        .short('s')
                        .long("seed")
                        .num_args(1)
                        .value_parser(value_parser!(u64))
                        .help("seed for the random number generator, for reproducible data"),
                ),
        ))
        .get_matches();
    configure_logging(&matches)?;

    info!("inkpot-admin {}", crate_version!());

    match matches.subcommand() {
        Some(("create-schema", sub)) => {
            let location = sub
                .get_one::<Location>("location")
                .cloned()
                .unwrap_or_default();
            let client = dynamodb::sdk_client(&location, sub.get_one::<Credentials>("creds"))
                .await
                .context(DynamoSnafu)?;
            create_schema(client).await.context(SchemaSnafu)?;
            info!("Created the inkpot schema.");
            Ok(())
        }
        Some(("add-user", sub)) => add_user(sub).await,
        Some(("generate-test-data", sub)) => test_data(sub).await,
        _ => unreachable!("a sub-command is required"),
    }
}
