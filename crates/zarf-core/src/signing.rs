//! Package signing with minisign
//!
//! The signature file `zarf.yaml.sig` is a minisign signature box over
//! the final `zarf.yaml` bytes. Because the definition carries the
//! aggregate checksum, the signature transitively binds every packaged
//! file.

use minisign::{KeyPair, PublicKeyBox, SecretKeyBox, SignatureBox};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::layout::PackageLayout;

/// Generate an unencrypted keypair, writing `<name>.key` / `<name>.pub`.
pub fn generate_keypair(dir: &Path, name: &str) -> Result<(PathBuf, PathBuf)> {
    let KeyPair { pk, sk } = KeyPair::generate_unencrypted_keypair()
        .map_err(|e| CoreError::Signing(e.to_string()))?;

    std::fs::create_dir_all(dir)?;
    let sk_path = dir.join(format!("{}.key", name));
    let pk_path = dir.join(format!("{}.pub", name));

    let sk_box = sk
        .to_box(None)
        .map_err(|e| CoreError::Signing(e.to_string()))?;
    let pk_box = pk.to_box().map_err(|e| CoreError::Signing(e.to_string()))?;

    std::fs::write(&sk_path, sk_box.to_string())?;
    std::fs::write(&pk_path, pk_box.to_string())?;

    Ok((sk_path, pk_path))
}

/// Sign the layout's definition, producing `zarf.yaml.sig`.
pub fn sign_definition(
    pkg_layout: &mut PackageLayout,
    key_path: &Path,
    password: Option<String>,
) -> Result<PathBuf> {
    let key_content = std::fs::read_to_string(key_path)?;
    let sk_box = SecretKeyBox::from_string(&key_content)
        .map_err(|e| CoreError::Signing(format!("failed to parse secret key: {}", e)))?;
    // Unencrypted keys decrypt with an empty password.
    let sk = sk_box
        .into_secret_key(password.or_else(|| Some(String::new())))
        .map_err(|e| CoreError::Signing(format!("failed to decrypt key: {}", e)))?;

    let data = std::fs::read(pkg_layout.definition_path())?;
    let mut cursor = Cursor::new(&data);
    let signature = minisign::sign(None, &sk, &mut cursor, None, None)
        .map_err(|e| CoreError::Signing(e.to_string()))?;

    let sig_path = pkg_layout.signature_path();
    std::fs::write(&sig_path, signature.to_string())?;
    pkg_layout.set_from_paths(&[crate::layout::SIGNATURE.to_string()]);

    Ok(sig_path)
}

/// Verify the layout's signature state against an optional public key.
///
/// - unsigned package, no key: nothing to do
/// - signed package, no key: `SignedButNoKey` (caller may downgrade)
/// - unsigned package, key supplied: `KeyButNotSigned`
/// - signed package, key supplied: verify or `SignatureInvalid`
pub fn verify_definition(pkg_layout: &PackageLayout, public_key: Option<&Path>) -> Result<()> {
    let signed = pkg_layout.has_signature();

    match (signed, public_key) {
        (false, None) => Ok(()),
        (true, None) => Err(CoreError::SignedButNoKey),
        (false, Some(_)) => Err(CoreError::KeyButNotSigned),
        (true, Some(key_path)) => {
            let pk_content = std::fs::read_to_string(key_path)?;
            let pk_box = PublicKeyBox::from_string(&pk_content)
                .map_err(|e| CoreError::SignatureInvalid(format!("invalid public key: {}", e)))?;
            let pk = pk_box
                .into_public_key()
                .map_err(|e| CoreError::SignatureInvalid(format!("invalid public key: {}", e)))?;

            let sig_content = std::fs::read_to_string(pkg_layout.signature_path())?;
            let sig_box = SignatureBox::from_string(&sig_content)
                .map_err(|e| CoreError::SignatureInvalid(format!("invalid signature: {}", e)))?;

            let data = std::fs::read(pkg_layout.definition_path())?;
            let mut cursor = Cursor::new(&data);
            minisign::verify(&pk, &sig_box, &mut cursor, true, false, false)
                .map_err(|e| CoreError::SignatureInvalid(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Package, PackageMetadata};
    use tempfile::TempDir;

    fn signed_layout(temp: &TempDir) -> (PackageLayout, PathBuf) {
        let mut pkg_layout = PackageLayout::create(&temp.path().join("pkg")).unwrap();
        let pkg = Package {
            metadata: PackageMetadata {
                name: "signed".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        pkg_layout.write_definition(&pkg).unwrap();

        let (sk, pk) = generate_keypair(&temp.path().join("keys"), "zarf").unwrap();
        sign_definition(&mut pkg_layout, &sk, None).unwrap();
        (pkg_layout, pk)
    }

    #[test]
    fn test_sign_and_verify() {
        let temp = TempDir::new().unwrap();
        let (pkg_layout, pk) = signed_layout(&temp);
        assert!(pkg_layout.has_signature());
        verify_definition(&pkg_layout, Some(&pk)).unwrap();
    }

    #[test]
    fn test_tampered_definition_fails() {
        let temp = TempDir::new().unwrap();
        let (pkg_layout, pk) = signed_layout(&temp);

        let mut content = std::fs::read_to_string(pkg_layout.definition_path()).unwrap();
        content.push_str("# tampered\n");
        std::fs::write(pkg_layout.definition_path(), content).unwrap();

        let err = verify_definition(&pkg_layout, Some(&pk)).unwrap_err();
        assert!(matches!(err, CoreError::SignatureInvalid(_)));
    }

    #[test]
    fn test_signed_but_no_key() {
        let temp = TempDir::new().unwrap();
        let (pkg_layout, _) = signed_layout(&temp);
        let err = verify_definition(&pkg_layout, None).unwrap_err();
        assert!(matches!(err, CoreError::SignedButNoKey));
    }

    #[test]
    fn test_wrong_key_fails() {
        let temp = TempDir::new().unwrap();
        let (pkg_layout, _) = signed_layout(&temp);
        let (_, other_pk) = generate_keypair(&temp.path().join("other"), "other").unwrap();
        let err = verify_definition(&pkg_layout, Some(&other_pk)).unwrap_err();
        assert!(matches!(err, CoreError::SignatureInvalid(_)));
    }

    #[test]
    fn test_unsigned_no_key_ok() {
        let temp = TempDir::new().unwrap();
        let mut pkg_layout = PackageLayout::create(temp.path()).unwrap();
        let pkg = Package::default();
        pkg_layout.write_definition(&pkg).unwrap();
        verify_definition(&pkg_layout, None).unwrap();
    }
}
