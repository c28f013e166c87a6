use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::process;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use dns_resolver::cache::SharedCache;
use dns_resolver::util::net::UdpTransport;
use dns_resolver::util::types::ResolveOptions;
use dns_resolver::{resolve, ROOT_SERVER};
use dns_types::protocol::types::{
    DomainName, QueryClass, QueryType, Question, RecordClass, RecordType, ResourceRecord,
};

mod settings;
use settings::Settings;

/// How often the background task sweeps expired records out of the
/// cache after the startup sweep.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// Iterative DNS lookup utility
///
/// Walks the delegation chain itself, from a root nameserver down to
/// an authoritative one, instead of asking a recursive resolver to do
/// it.  Upstream nameservers are only queried over IPv4.
struct Args {
    /// Domain name to resolve
    #[clap(value_parser)]
    domain: DomainName,

    /// Query type to resolve
    #[clap(default_value_t = QueryType::Record(RecordType::A), value_parser)]
    qtype: QueryType,

    /// Skip the cache lookup and always go to the network
    #[clap(long, action(clap::ArgAction::SetTrue))]
    no_cache: bool,
}

fn sweep_cache(cache: &SharedCache) {
    let (overflow, current_size, expired, pruned) = cache.prune();
    if expired > 0 || pruned > 0 {
        tracing::info!(%expired, %pruned, %current_size, "pruned cache");
    }
    if overflow {
        tracing::warn!(%current_size, "cache overflowed its desired size");
    }
}

fn print_answers(rrs: &[ResourceRecord]) {
    for rr in rrs {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            rr.name,
            rr.ttl,
            rr.rclass,
            rr.rtype_with_data.rtype(),
            rr.rtype_with_data.rdata_string()
        );
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("could not load configuration: {error}");
            process::exit(1);
        }
    };

    let root = match settings.root_server {
        Some(address) => SocketAddr::new(IpAddr::V4(address), settings.root_port.unwrap_or(53)),
        None => ROOT_SERVER,
    };

    let options = ResolveOptions {
        use_cache: !args.no_cache,
        timeout: Duration::from_secs(settings.timeout_seconds.unwrap_or(5)),
        ..Default::default()
    };

    let cache = match settings.cache_size {
        Some(size) => SharedCache::with_desired_size(size),
        None => SharedCache::new(),
    };

    // sweep expired records once at startup and then periodically;
    // resolution does not wait for this
    let bg_cache = cache.clone();
    tokio::spawn(async move {
        loop {
            sweep_cache(&bg_cache);
            sleep(CACHE_SWEEP_INTERVAL).await;
        }
    });

    let question = Question {
        name: args.domain,
        qtype: args.qtype,
        qclass: QueryClass::Record(RecordClass::IN),
    };

    let transport = UdpTransport::new(options.timeout);

    match resolve(&transport, &cache, root, &question, options).await {
        Ok(rrs) => print_answers(&rrs),
        Err(error) => {
            eprintln!("{error}");
            process::exit(1);
        }
    }
}
