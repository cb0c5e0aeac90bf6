//! Integration tests for CLI commands

use std::path::Path;
use std::process::Command;

/// Helper to run the zarf binary
fn zarf(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_zarf"))
        .args(args)
        .output()
        .expect("Failed to execute zarf")
}

fn write_minimal_package(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("zarf.yaml"),
        r#"kind: ZarfPackageConfig
metadata:
  name: hello
  version: 0.1.0
  sourceDateEpoch: 1700000000
components:
  - name: app
    required: true
    manifests:
      - name: hello
        namespace: demo
        files:
          - hello.yaml
"#,
    )
    .unwrap();
    std::fs::write(dir.join("hello.yaml"), "kind: ConfigMap\n").unwrap();
}

mod create_command {
    use super::*;

    #[test]
    fn test_create_minimal_package() {
        let temp = tempfile::TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        let out_dir = temp.path().join("out");
        write_minimal_package(&pkg_dir);

        let output = zarf(&[
            "create",
            pkg_dir.to_str().unwrap(),
            "--output",
            out_dir.to_str().unwrap(),
            "--architecture",
            "amd64",
            "--cache-dir",
            temp.path().join("cache").to_str().unwrap(),
        ]);

        assert!(
            output.status.success(),
            "create failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        assert!(out_dir
            .join("zarf-package-hello-amd64-0.1.0.tar.zst")
            .exists());
    }

    #[test]
    fn test_create_invalid_definition_exits_2() {
        let temp = tempfile::TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        // Uppercase package names violate DNS-1123.
        std::fs::write(
            pkg_dir.join("zarf.yaml"),
            "kind: ZarfPackageConfig\nmetadata:\n  name: Bad_Name\ncomponents: []\n",
        )
        .unwrap();

        let output = zarf(&["create", pkg_dir.to_str().unwrap()]);
        assert_eq!(output.status.code(), Some(2));
    }
}

mod inspect_command {
    use super::*;

    #[test]
    fn test_inspect_created_archive() {
        let temp = tempfile::TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        let out_dir = temp.path().join("out");
        write_minimal_package(&pkg_dir);

        let output = zarf(&[
            "create",
            pkg_dir.to_str().unwrap(),
            "--output",
            out_dir.to_str().unwrap(),
            "--architecture",
            "amd64",
            "--cache-dir",
            temp.path().join("cache").to_str().unwrap(),
        ]);
        assert!(output.status.success());

        let archive = out_dir.join("zarf-package-hello-amd64-0.1.0.tar.zst");
        let output = zarf(&["inspect", archive.to_str().unwrap()]);
        assert!(
            output.status.success(),
            "inspect failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("name: hello"));
        assert!(stdout.contains("aggregateChecksum"));
    }

    #[test]
    fn test_tampered_archive_exits_4() {
        let temp = tempfile::TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        let out_dir = temp.path().join("out");
        write_minimal_package(&pkg_dir);

        assert!(zarf(&[
            "create",
            pkg_dir.to_str().unwrap(),
            "--output",
            out_dir.to_str().unwrap(),
            "--architecture",
            "amd64",
            "--uncompressed",
            "--cache-dir",
            temp.path().join("cache").to_str().unwrap(),
        ])
        .status
        .success());

        // Rewrite the archive with a corrupted component tar.
        let archive = out_dir.join("zarf-package-hello-amd64-0.1.0.tar");
        let extracted = temp.path().join("extracted");
        zarf_core::archive::extract_archive(&archive, &extracted).unwrap();
        let layout = zarf_core::layout::PackageLayout::open(&extracted).unwrap();
        std::fs::write(layout.component_tar("app"), b"tampered").unwrap();
        zarf_core::archive::archive_layout(&layout, &archive, 0).unwrap();

        // Publish verifies the full layout before any network traffic.
        let output = zarf(&[
            "publish",
            archive.to_str().unwrap(),
            "oci://localhost:5000/org",
        ]);
        assert_eq!(output.status.code(), Some(4));
    }
}

mod keygen_command {
    use super::*;

    #[test]
    fn test_keygen_writes_keypair() {
        let temp = tempfile::TempDir::new().unwrap();
        let output = zarf(&["keygen", "--output", temp.path().to_str().unwrap()]);
        assert!(output.status.success());
        assert!(temp.path().join("zarf.key").exists());
        assert!(temp.path().join("zarf.pub").exists());
    }
}
