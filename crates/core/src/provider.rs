//! Provider identity: validation, archive filenames, cache keys.
//!
//! A provider release is addressed by the four-tuple
//! `(registry, namespace, provider, version)`; a binary archive adds
//! `(os, arch)`. Cache keys mirror the on-disk layout Terraform expects:
//! `registry/namespace/provider/version/terraform-provider-<p>_<v>_<os>_<arch>.zip`.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Operating systems providers are published for.
pub const VALID_OS: &[&str] = &["darwin", "freebsd", "linux", "openbsd", "solaris", "windows"];

/// Architectures providers are published for.
pub const VALID_ARCH: &[&str] = &["386", "amd64", "arm", "arm64", "ppc64le"];

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?$").unwrap());

static PROVIDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+\.\d+\.\d+(-[a-zA-Z0-9.+-]+)?(\+[a-zA-Z0-9.+-]+)?$").unwrap()
});

static ARCHIVE_FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^terraform-provider-([^_]+?)_(\d+\.\d+\.\d+(?:-[\w-]+)?)_([^_]+)_([^.]+)\.zip$")
        .unwrap()
});

/// Check that a registry looks like a hostname: non-empty, no spaces or
/// path separators.
pub fn is_valid_registry(registry: &str) -> bool {
    !registry.is_empty() && !registry.contains([' ', '/', '\\'])
}

/// Check that a namespace is a DNS label: alphanumerics plus interior hyphens.
pub fn is_valid_namespace(namespace: &str) -> bool {
    NAMESPACE_RE.is_match(namespace)
}

/// Check that a provider name is lowercase alphanumerics plus interior hyphens.
pub fn is_valid_provider(provider: &str) -> bool {
    PROVIDER_RE.is_match(provider) && !provider.starts_with('-') && !provider.ends_with('-')
}

/// Check that a version is SemVer 2.0 with optional pre-release and build
/// suffixes.
pub fn is_valid_version(version: &str) -> bool {
    VERSION_RE.is_match(version)
}

pub fn is_valid_os(os: &str) -> bool {
    VALID_OS.contains(&os)
}

pub fn is_valid_arch(arch: &str) -> bool {
    VALID_ARCH.contains(&arch)
}

/// Name components parsed out of a provider archive filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveFilename {
    pub provider: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

/// Parse a `terraform-provider-<p>_<v>_<os>_<arch>.zip` filename.
///
/// Only the filename shape is checked here; callers validate the captured
/// components against the allow-lists separately.
pub fn parse_archive_filename(filename: &str) -> Result<ArchiveFilename> {
    let captures = ARCHIVE_FILENAME_RE
        .captures(filename)
        .ok_or_else(|| Error::InvalidFilename(filename.to_string()))?;

    Ok(ArchiveFilename {
        provider: captures[1].to_string(),
        version: captures[2].to_string(),
        os: captures[3].to_string(),
        arch: captures[4].to_string(),
    })
}

/// Full identity of a provider binary archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderArchive {
    pub registry: String,
    pub namespace: String,
    pub provider: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

impl ProviderArchive {
    /// Validate every component against the identifier rules.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_registry(&self.registry) {
            return Err(Error::InvalidRegistry(self.registry.clone()));
        }
        if !is_valid_namespace(&self.namespace) {
            return Err(Error::InvalidNamespace(self.namespace.clone()));
        }
        if !is_valid_provider(&self.provider) {
            return Err(Error::InvalidProvider(self.provider.clone()));
        }
        if !is_valid_version(&self.version) {
            return Err(Error::InvalidVersion(self.version.clone()));
        }
        if !is_valid_os(&self.os) {
            return Err(Error::InvalidOs(self.os.clone()));
        }
        if !is_valid_arch(&self.arch) {
            return Err(Error::InvalidArch(self.arch.clone()));
        }
        Ok(())
    }

    /// Standard archive filename for this release.
    pub fn filename(&self) -> String {
        archive_filename(&self.provider, &self.version, &self.os, &self.arch)
    }

    /// Storage key for the cached archive.
    ///
    /// Keys are path-like but are never interpreted as filesystem paths by
    /// callers; the store backends own that mapping.
    pub fn cache_key(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.registry,
            self.namespace,
            self.provider,
            self.version,
            self.filename()
        )
    }
}

/// Build the standard `terraform-provider-<p>_<v>_<os>_<arch>.zip` filename.
pub fn archive_filename(provider: &str, version: &str, os: &str, arch: &str) -> String {
    format!("terraform-provider-{provider}_{version}_{os}_{arch}.zip")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive() -> ProviderArchive {
        ProviderArchive {
            registry: "registry.terraform.io".to_string(),
            namespace: "hashicorp".to_string(),
            provider: "random".to_string(),
            version: "3.7.2".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
        }
    }

    #[test]
    fn registry_validation() {
        assert!(is_valid_registry("registry.terraform.io"));
        assert!(is_valid_registry("127.0.0.1:8080"));
        assert!(!is_valid_registry(""));
        assert!(!is_valid_registry("bad host"));
        assert!(!is_valid_registry("host/path"));
        assert!(!is_valid_registry("host\\path"));
    }

    #[test]
    fn namespace_validation() {
        assert!(is_valid_namespace("hashicorp"));
        assert!(is_valid_namespace("1Password"));
        assert!(is_valid_namespace("my-org"));
        assert!(is_valid_namespace("a"));
        assert!(!is_valid_namespace(""));
        assert!(!is_valid_namespace("-leading"));
        assert!(!is_valid_namespace("trailing-"));
        assert!(!is_valid_namespace("dots.not.allowed"));
    }

    #[test]
    fn provider_validation() {
        assert!(is_valid_provider("random"));
        assert!(is_valid_provider("google-beta"));
        assert!(!is_valid_provider(""));
        assert!(!is_valid_provider("Random"));
        assert!(!is_valid_provider("-aws"));
        assert!(!is_valid_provider("aws-"));
    }

    #[test]
    fn version_validation() {
        assert!(is_valid_version("3.7.2"));
        assert!(is_valid_version("1.0.0-beta.1"));
        assert!(is_valid_version("1.0.0+build.5"));
        assert!(is_valid_version("1.0.0-rc1+meta"));
        assert!(!is_valid_version(""));
        assert!(!is_valid_version("1.2"));
        assert!(!is_valid_version("v1.2.3"));
        assert!(!is_valid_version("1.2.3.4"));
    }

    #[test]
    fn os_and_arch_allow_lists() {
        for os in VALID_OS {
            assert!(is_valid_os(os));
        }
        assert!(!is_valid_os("plan9"));
        for arch in VALID_ARCH {
            assert!(is_valid_arch(arch));
        }
        assert!(!is_valid_arch("riscv64"));
    }

    #[test]
    fn parse_archive_filename_components() {
        let parsed =
            parse_archive_filename("terraform-provider-random_3.7.2_linux_amd64.zip").unwrap();
        assert_eq!(parsed.provider, "random");
        assert_eq!(parsed.version, "3.7.2");
        assert_eq!(parsed.os, "linux");
        assert_eq!(parsed.arch, "amd64");
    }

    #[test]
    fn parse_archive_filename_prerelease() {
        let parsed =
            parse_archive_filename("terraform-provider-aws_5.0.0-beta1_darwin_arm64.zip").unwrap();
        assert_eq!(parsed.version, "5.0.0-beta1");
    }

    #[test]
    fn parse_archive_filename_rejects_garbage() {
        assert!(parse_archive_filename("random_3.7.2_linux_amd64.zip").is_err());
        assert!(parse_archive_filename("terraform-provider-random_3.7_linux_amd64.zip").is_err());
        assert!(parse_archive_filename("terraform-provider-random_3.7.2_linux.zip").is_err());
        assert!(parse_archive_filename("terraform-provider-random_3.7.2_linux_amd64.tar").is_err());
        assert!(parse_archive_filename("not-a-provider.txt").is_err());
    }

    #[test]
    fn cache_key_layout() {
        assert_eq!(
            archive().cache_key(),
            "registry.terraform.io/hashicorp/random/3.7.2/terraform-provider-random_3.7.2_linux_amd64.zip"
        );
    }

    #[test]
    fn validate_accepts_good_identity() {
        archive().validate().unwrap();
    }

    #[test]
    fn validate_rejects_each_position() {
        let mut bad = archive();
        bad.registry = "bad registry".to_string();
        assert!(matches!(bad.validate(), Err(Error::InvalidRegistry(_))));

        let mut bad = archive();
        bad.namespace = "-bad".to_string();
        assert!(matches!(bad.validate(), Err(Error::InvalidNamespace(_))));

        let mut bad = archive();
        bad.provider = "Random".to_string();
        assert!(matches!(bad.validate(), Err(Error::InvalidProvider(_))));

        let mut bad = archive();
        bad.version = "not-a-version".to_string();
        assert!(matches!(bad.validate(), Err(Error::InvalidVersion(_))));

        let mut bad = archive();
        bad.os = "plan9".to_string();
        assert!(matches!(bad.validate(), Err(Error::InvalidOs(_))));

        let mut bad = archive();
        bad.arch = "riscv64".to_string();
        assert!(matches!(bad.validate(), Err(Error::InvalidArch(_))));
    }
}
