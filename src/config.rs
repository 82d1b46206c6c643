//! Config for the directory client.
use std::{
	fs::File,
	io::BufReader,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};

use ldap3::LdapConnSettings;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Format of the `( 1.3.6.1.4.1.1466.115.121.1.24 DESC 'Generalized Time' )`
/// syntax described in RFC4517 section 3.1.13, without the fraction and time
/// zone suffix (Active Directory writes e.g. `20130516200520.0Z`).
pub const TIME_FORMAT: &[time::format_description::FormatItem] =
	time::macros::format_description!("[year][month][day][hour][minute][second]");

/// Directory client configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
	/// The URL to connect to the server with. Supports ldap, ldaps, and ldapi
	/// schemes
	pub url: Url,
	/// Connection settings.
	#[serde(default)]
	pub connection: ConnectionConfig,
	/// The user to bind as. Without it, the session's own identity is used.
	#[serde(default)]
	pub search_user: Option<String>,
	/// The password for the search user
	#[serde(default)]
	pub search_password: Option<String>,
	/// Distinguished name of the directory root. Read from the rootDSE when
	/// not set.
	#[serde(default)]
	pub naming_context: Option<String>,
	/// Options passed along with every query
	#[serde(default)]
	pub query: QueryOptions,
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	pub timeout: u64,

	/// Timeout for all other LDAP operations.
	pub operation_timeout: Duration,

	/// TLS config
	pub tls: TLSConfig,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self { timeout: 5, operation_timeout: Duration::from_secs(5), tls: TLSConfig::default() }
	}
}

/// TLS Configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TLSConfig {
	/// Use StartTLS extended operation for establishing a secure connection,
	/// rather than TLS on a dedicated port.
	pub starttls: bool,

	/// Disable verification of TLS certificates
	pub no_tls_verify: bool,

	/// TLS root certificates path
	pub root_certificates_path: Option<PathBuf>,

	/// Path of the TLS client key to use for the connection
	pub client_key_path: Option<PathBuf>,

	/// Path of the TLS client certificate to use for the connection
	pub client_certificate_path: Option<PathBuf>,
}

/// Options handed to the directory provider with every query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
	/// Ask the provider to return rows as soon as they arrive instead of
	/// after the whole result set is known.
	pub asynchronous: bool,
	/// How long the directory may take for the query.
	pub timeout: Duration,
	/// If set, results are fetched in pages of this size using the
	/// [simple paged search control].
	///
	/// [simple paged search control]: https://www.rfc-editor.org/rfc/rfc2696.html
	pub page_size: Option<i32>,
}

impl Default for QueryOptions {
	fn default() -> Self {
		Self { asynchronous: true, timeout: Duration::from_secs(5), page_size: Some(50) }
	}
}

impl ConnectionConfig {
	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) fn to_settings(&self) -> Result<LdapConnSettings, Error> {
		let mut settings = LdapConnSettings::new();

		settings = settings.set_conn_timeout(Duration::from_secs(self.timeout));
		settings = settings.set_starttls(self.tls.starttls);
		settings = settings.set_no_tls_verify(self.tls.no_tls_verify);

		if let Some(path) = &self.tls.root_certificates_path {
			let mut roots = rustls::RootCertStore::empty();
			let certificates = read_certificates(path)?;
			let (added, _) = roots.add_parsable_certificates(certificates.as_slice());
			if added == 0 {
				return Err(Error::Invalid("Could not read root certificate".to_owned()));
			}
			let builder = rustls::ClientConfig::builder()
				.with_safe_defaults()
				.with_root_certificates(roots);

			let config = match (&self.tls.client_key_path, &self.tls.client_certificate_path) {
				(Some(key_path), Some(cert_path)) => {
					let chain = read_certificates(cert_path)?
						.into_iter()
						.map(rustls::Certificate)
						.collect::<Vec<_>>();
					let key = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(
						File::open(key_path)?,
					))?
					.into_iter()
					.next()
					.ok_or_else(|| Error::Invalid("Could not read client key".to_owned()))?;
					builder.with_client_auth_cert(chain, rustls::PrivateKey(key)).map_err(|_| {
						Error::Invalid("Could not read client certificates".to_owned())
					})?
				}
				(None, None) => builder.with_no_client_auth(),
				_ => Err(Error::Invalid(
					"Both a client certificate and key file in PKCS8 format must be specified"
						.to_owned(),
				))?,
			};
			settings = settings.set_config(Arc::new(config));
		}
		Ok(settings)
	}
}

/// Read all PEM encoded certificates of a file.
fn read_certificates(path: &Path) -> Result<Vec<Vec<u8>>, Error> {
	let certificates = rustls_pemfile::certs(&mut BufReader::new(File::open(path)?))?;
	if certificates.is_empty() {
		return Err(Error::Invalid(format!("No certificates in {}", path.display())));
	}
	Ok(certificates)
}
