use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use edfs::constitution::{self, BuildOptions, CommandBundler};
use edfs::http::{gen_router, AppState, DEFAULT_UPLOAD_LIMIT};
use edfs::security::AUTH_TOKEN_ENV;
use edfs::transport::{self, TransportRegistry};
use edfs::{ArchiveConfig, ArchiveKind, Edfs, Seed};
use tracing::{info, info_span, Instrument, Level, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

/// Name the `--endpoint` transport is registered under.
const DEFAULT_STRATEGY: &str = "default";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Whether to log in JSON
    #[arg(long)]
    json: bool,

    #[arg(long)]
    log_level: Option<Level>,

    /// Where bricks are stored, as understood by `transport::from_addr`.
    #[arg(long, env = "EDFS_ENDPOINT", default_value = "http://[::1]:8000/")]
    endpoint: String,

    /// Average brick size in bytes.
    #[arg(long, env = "EDFS_AVG_CHUNK_SIZE")]
    avg_chunk_size: Option<u32>,

    /// Maximum number of parallel brick uploads per file.
    #[arg(long, env = "EDFS_UPLOAD_CONCURRENCY")]
    upload_concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serves a transport over the brick HTTP protocol.
    Daemon {
        #[arg(long, short = 'l', default_value = "[::]:8000")]
        listen_address: String,

        /// The transport actually holding the bricks.
        #[arg(long, env = "EDFS_BACKEND", default_value = "objectstore+file:///var/lib/edfs")]
        backend: String,

        #[arg(long, env = "EDFS_UPLOAD_LIMIT", default_value_t = DEFAULT_UPLOAD_LIMIT)]
        upload_limit: usize,

        /// Only serve requests carrying this bearer token.
        #[arg(long, env = AUTH_TOKEN_ENV)]
        auth_token: Option<String>,
    },
    /// Deploys the given files as constitution of a new bar, and prints its seed.
    DeployBar {
        #[clap(value_name = "PATH", required = true)]
        files: Vec<PathBuf>,
    },
    /// Deploys the given files as constitution of a new csb, and prints its seed.
    DeployCsb {
        #[clap(value_name = "PATH", required = true)]
        files: Vec<PathBuf>,
    },
    /// Deploys all files in a folder as constitution of a new csb, and prints its seed.
    DeployFolderCsb {
        #[clap(value_name = "PATH")]
        folder: PathBuf,
    },
    /// Writes the constitution files of the archive behind a seed to a folder.
    GetFiles {
        seed: Seed,

        /// Only retrieve files with this name. Can be passed multiple times.
        #[arg(long = "file")]
        files: Vec<String>,

        #[arg(long, short = 'o', default_value = ".")]
        output: PathBuf,
    },
    /// Bundles sources into a constitution with an external build program.
    BuildConstitution {
        #[clap(value_name = "PATH", required = true)]
        sources: Vec<PathBuf>,

        #[arg(long, default_value = "constitution")]
        name: String,

        /// Where the bundle is written to. Defaults to a temporary folder.
        #[arg(long)]
        output_folder: Option<PathBuf>,

        /// Keep the temporary build folder.
        #[arg(long)]
        keep_tmp_dir: bool,

        #[arg(long, env = "EDFS_BUNDLER", default_value = "pskbuild")]
        bundler: PathBuf,

        /// Extra arguments passed to the bundler before the generated ones.
        #[arg(long = "bundler-arg")]
        bundler_args: Vec<String>,
    },
}

impl Cli {
    fn archive_config(&self) -> ArchiveConfig {
        let mut config = ArchiveConfig::default();
        if let Some(avg_chunk_size) = self.avg_chunk_size {
            config.avg_chunk_size = avg_chunk_size;
        }
        if let Some(upload_concurrency) = self.upload_concurrency {
            config.upload_concurrency = upload_concurrency;
        }
        config
    }

    fn edfs(&self) -> Result<Edfs, edfs::Error> {
        let registry = TransportRegistry::default();
        registry.register_addr(DEFAULT_STRATEGY, &self.endpoint)?;
        Edfs::attach(Arc::new(registry), DEFAULT_STRATEGY)?.with_config(self.archive_config())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let tracing_handle = {
        let mut builder = edfs_tracing::TracingBuilder::default()
            .level(cli.log_level.unwrap_or(Level::INFO))
            .enable_progressbar();
        if cli.json {
            builder = builder.enable_json();
        }
        builder.build()?
    };
    let mut stdout = tracing_handle.get_stdout_writer();

    match &cli.command {
        Commands::Daemon {
            listen_address,
            backend,
            upload_limit,
            auth_token,
        } => {
            let backend = transport::from_addr(backend)?;
            let state = AppState::new(backend, auth_token.clone());
            let app = gen_router(*upload_limit).with_state(state);

            let listener = tokio::net::TcpListener::bind(listen_address).await?;
            info!(listen_address=%listener.local_addr()?, "starting daemon");

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("shutting down");
                })
                .await?;
        }
        Commands::DeployBar { files } => {
            let seed = constitution::deploy_constitution_bar(&cli.edfs()?, files).await?;
            writeln!(stdout, "{}", seed)?;
        }
        Commands::DeployCsb { files } => {
            let seed = constitution::deploy_constitution_csb(&cli.edfs()?, files).await?;
            writeln!(stdout, "{}", seed)?;
        }
        Commands::DeployFolderCsb { folder } => {
            let seed = constitution::deploy_constitution_folder_csb(&cli.edfs()?, folder).await?;
            writeln!(stdout, "{}", seed)?;
        }
        Commands::GetFiles {
            seed,
            files,
            output,
        } => {
            let edfs = cli.edfs()?;
            let filter = (!files.is_empty()).then_some(files.as_slice());

            let constitution = match seed.kind() {
                ArchiveKind::Bar => {
                    constitution::get_constitution_files_from_bar(&edfs, seed, filter).await?
                }
                ArchiveKind::Csb => {
                    constitution::get_constitution_files_from_csb(&edfs, seed, filter).await?
                }
            };

            let span = info_span!("write_files", indicatif.pb_show = 1);
            span.pb_set_style(&edfs_tracing::PB_PROGRESS_STYLE);
            span.pb_set_length(constitution.len() as u64);
            span.pb_set_message("Writing files");

            async {
                tokio::fs::create_dir_all(output).await?;
                for (name, contents) in &constitution {
                    tokio::fs::write(output.join(name), contents).await?;
                    Span::current().pb_inc(1);
                }
                Ok::<_, std::io::Error>(())
            }
            .instrument(span)
            .await?;

            for name in constitution.keys() {
                writeln!(stdout, "{}", output.join(name).display())?;
            }
        }
        Commands::BuildConstitution {
            sources,
            name,
            output_folder,
            keep_tmp_dir,
            bundler,
            bundler_args,
        } => {
            let options = BuildOptions {
                constitution_name: name.clone(),
                output_folder: output_folder.clone(),
                cleanup_tmp_dir: !keep_tmp_dir,
            };
            let bundler = CommandBundler::new(bundler).with_args(bundler_args.iter().cloned());

            let constitution =
                constitution::create_constitution_from_sources(sources, &options, &bundler)
                    .await?;
            writeln!(stdout, "{}", constitution.display())?;
        }
    }

    Ok(())
}
