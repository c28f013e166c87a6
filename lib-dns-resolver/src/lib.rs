#![warn(clippy::pedantic)]
// Don't care enough to fix
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::wildcard_imports)]

pub mod cache;
pub mod iterative;
pub mod util;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub use self::iterative::resolve;

/// The root nameserver resolution starts from: a.root-servers.net.
pub const ROOT_SERVER: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(198, 41, 0, 4)), 53);

/// Maximum length of a chain of aliases.  A CNAME chain longer than
/// this cannot be resolved.
///
/// This is to protect against a maliciously-configured nameserver
/// which returns an endless sequence of aliases.
pub const MAX_CNAME_CHAIN: usize = 16;

/// Maximum depth of nameserver-address sub-resolutions.  Referrals
/// without glue need the nameserver's own address resolved first;
/// a nameserver whose address is itself behind this many glueless
/// referrals cannot be used.
///
/// The visited-server set catches glueless referrals that actually
/// cycle; this bounds chains that keep naming fresh servers.
pub const MAX_NS_CHAIN: usize = 16;
