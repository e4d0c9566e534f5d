//! Repository signature manifests.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::Result;
use crate::manifest::text::{ManifestParser, ManifestSerializer, NameValue};
use crate::manifest::{bad_name, bad_value, valid_sha256};

/// The signature manifest of a pkg repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureManifest {
    /// Checksum of the corresponding package manifests file.
    pub sha256sum: String,

    /// Signature of the checksum, produced with the repository
    /// certificate private key. Decoded from the base64 manifest value.
    pub signature: Vec<u8>,
}

impl SignatureManifest {
    /// Parse a single signature manifest.
    pub fn parse(
        p: &mut ManifestParser,
        ignore_unknown: bool,
    ) -> Result<Self> {
        let nv = p.next()?;
        let m = Self::parse_element(p, nv, ignore_unknown)?;

        // Make sure this is the end.
        let nv = p.next()?;
        if !nv.is_end() {
            return Err(bad_name(
                p.source_name(),
                &nv,
                "single signature manifest expected",
            ));
        }

        Ok(m)
    }

    /// Parse a signature manifest from the already-consumed start pair.
    pub fn parse_element(
        p: &mut ManifestParser,
        nv: NameValue,
        ignore_unknown: bool,
    ) -> Result<Self> {
        let src = p.source_name().to_string();

        if !nv.name.is_empty() {
            return Err(bad_name(
                &src,
                &nv,
                "start of signature manifest expected",
            ));
        }

        if nv.value != "1" {
            return Err(bad_value(&src, &nv, "unsupported format version"));
        }

        let mut m = Self::default();
        let end;

        loop {
            let nv = p.next()?;

            if nv.is_end() {
                end = nv;
                break;
            }

            match nv.name.as_str() {
                "sha256sum" => {
                    if !m.sha256sum.is_empty() {
                        return Err(bad_name(
                            &src,
                            &nv,
                            "sha256sum redefinition",
                        ));
                    }

                    if nv.value.is_empty() {
                        return Err(bad_value(&src, &nv, "empty sha256sum"));
                    }

                    if !valid_sha256(&nv.value) {
                        return Err(bad_value(&src, &nv, "invalid sha256sum"));
                    }

                    m.sha256sum = nv.value;
                }
                "signature" => {
                    if !m.signature.is_empty() {
                        return Err(bad_name(
                            &src,
                            &nv,
                            "signature redefinition",
                        ));
                    }

                    if nv.value.is_empty() {
                        return Err(bad_value(&src, &nv, "empty signature"));
                    }

                    // Base64-decode as a sanity check.
                    m.signature =
                        BASE64.decode(&nv.value).map_err(|_| {
                            bad_value(&src, &nv, "invalid signature")
                        })?;
                }
                n => {
                    if !ignore_unknown {
                        return Err(bad_name(
                            &src,
                            &nv,
                            format!(
                                "unknown name '{n}' in signature manifest"
                            ),
                        ));
                    }
                }
            }
        }

        // Verify all non-optional values were specified.
        if m.sha256sum.is_empty() {
            return Err(bad_value(&src, &end, "no sha256sum specified"));
        } else if m.signature.is_empty() {
            return Err(bad_value(&src, &end, "no signature specified"));
        }

        Ok(m)
    }

    /// Serialize the checksum and the base64-encoded signature.
    pub fn serialize(&self, s: &mut ManifestSerializer) -> Result<()> {
        s.next("", "1")?;

        s.next("sha256sum", &self.sha256sum)?;
        s.next("signature", &BASE64.encode(&self.signature))?;

        s.next("", "")?;

        Ok(())
    }
}
