// tisdk-core/tests/install.rs
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use httpmock::prelude::*;
use tempfile::TempDir;
use tisdk_common::config::{CatalogUrls, Config, NetworkConfig};
use tisdk_common::platform;
use tisdk_common::progress::ProgressEvent;
use tisdk_core::install::STAGING_PREFIX;
use tisdk_core::{
    get_installed_modules, get_installed_sdks, install_module, install_sdk, uninstall_sdk,
    InstallRequest, ModuleInstallRequest,
};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const SDK_NAME: &str = "0.0.0.GA";
const MANIFEST: &str = r#"{"name":"0.0.0.v20190304080000","version":"0.0.0","timestamp":"3/4/2019 08:00","githash":"c67357105b2eeb56a8940cf583f96fe21f94e213","moduleAPIVersion":{"iphone":"2","android":"4"},"platforms":["android"]}"#;
const MODULE_MANIFEST: &str = "version: 1.0.0\napiversion: 4\nmoduleid: ti.test\nplatform: android\n";
const HASH: &str = "c67357105b2eeb56a8940cf583f96fe21f94e213";

fn opts() -> SimpleFileOptions {
    SimpleFileOptions::default()
}

fn sdk_prefix() -> String {
    format!("mobilesdk/{}/{}", platform::os_name(), SDK_NAME)
}

fn write_sdk_zip(path: &Path) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let prefix = sdk_prefix();

    zip.add_directory(format!("{prefix}/"), opts()).unwrap();
    zip.start_file(format!("{prefix}/manifest.json"), opts()).unwrap();
    zip.write_all(MANIFEST.as_bytes()).unwrap();
    zip.add_directory(format!("{prefix}/android/"), opts()).unwrap();
    zip.start_file(format!("{prefix}/android/builder.js"), opts()).unwrap();
    zip.write_all(b"module.exports = {};\n").unwrap();
    zip.start_file(
        format!("{prefix}/titanium"),
        opts().unix_permissions(0o755),
    )
    .unwrap();
    zip.write_all(b"#!/bin/sh\n").unwrap();
    zip.add_symlink(format!("{prefix}/node_modules"), "android", opts())
        .unwrap();
    zip.add_symlink(format!("{prefix}/manifest-link.json"), "manifest.json", opts())
        .unwrap();

    zip.start_file("modules/android/ti.test/1.0.0/manifest", opts())
        .unwrap();
    zip.write_all(MODULE_MANIFEST.as_bytes()).unwrap();
    zip.start_file("modules/android/ti.test/1.0.0/ti.test.jar", opts())
        .unwrap();
    zip.write_all(b"jar").unwrap();
    zip.finish().unwrap();
}

fn write_module_zip(path: &Path) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    zip.start_file("modules/iphone/ti.other/2.1.0/manifest", opts())
        .unwrap();
    zip.write_all(b"version: 2.1.0\nmoduleid: ti.other\n").unwrap();
    zip.start_file("modules/iphone/ti.other/2.1.0/libti.other.a", opts())
        .unwrap();
    zip.write_all(b"lib").unwrap();
    zip.start_file("plugins/ti.hook/1.0/hooks/run.js", opts()).unwrap();
    zip.write_all(b"// hook").unwrap();
    zip.finish().unwrap();
}

struct Fixture {
    tmp: TempDir,
    root: PathBuf,
    config: Config,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("titanium");
        fs::create_dir_all(&root).unwrap();
        let config = Config {
            search_paths: vec![root.clone()],
            ..Config::default()
        };
        Self { tmp, root, config }
    }

    fn with_server(server: &MockServer) -> Self {
        let mut fixture = Self::new();
        fixture.config.urls = CatalogUrls {
            branches: server.url("/branches.json"),
            builds: server.url("/<BRANCH>/index.json"),
            build: server.url("/builds/<BRANCH>/<FILENAME>"),
            releases: server.url("/releases.json"),
        };
        fixture
    }

    fn sdk_zip(&self) -> PathBuf {
        let path = self.tmp.path().join("sdk.zip");
        if !path.exists() {
            write_sdk_zip(&path);
        }
        path
    }

    fn sdk_path(&self) -> PathBuf {
        self.config.sdk_dir(&self.root).join(SDK_NAME)
    }

    fn request(&self, uri: &Path) -> InstallRequest {
        InstallRequest {
            uri: Some(uri.to_string_lossy().into_owned()),
            ..InstallRequest::default()
        }
    }
}

/// Extraction directories left behind in the install root.
fn staging_dirs(root: &Path) -> Vec<String> {
    fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(STAGING_PREFIX))
        .collect()
}

fn recorder() -> (
    Box<dyn FnMut(ProgressEvent) + Send>,
    Arc<Mutex<Vec<ProgressEvent>>>,
) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (Box::new(move |e| sink.lock().unwrap().push(e)), events)
}

#[tokio::test]
async fn installs_sdk_from_local_zip() {
    let fx = Fixture::new();
    let (callback, events) = recorder();
    let request = InstallRequest {
        on_progress: Some(callback),
        ..fx.request(&fx.sdk_zip())
    };

    let sdk = install_sdk(&fx.config, request).await.unwrap();
    assert_eq!(sdk.name, SDK_NAME);
    assert_eq!(sdk.path, fx.sdk_path());

    let expected: serde_json::Value = serde_json::from_str(MANIFEST).unwrap();
    assert_eq!(serde_json::Value::Object(sdk.manifest.clone()), expected);

    let installed: Vec<_> = get_installed_sdks(&fx.config)
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.path.starts_with(fx.tmp.path()))
        .collect();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].name, SDK_NAME);
    assert_eq!(serde_json::Value::Object(installed[0].manifest.clone()), expected);

    assert!(fx
        .root
        .join("modules/android/ti.test/1.0.0/ti.test.jar")
        .is_file());
    assert!(fx.sdk_zip().exists(), "local archives are never removed");

    let events = events.lock().unwrap();
    assert_eq!(
        events.first(),
        Some(&ProgressEvent::Tasks {
            tasks: vec![
                "Extracting SDK".into(),
                "Installing SDK".into(),
                "Installing bundled modules".into()
            ]
        })
    );
    assert_eq!(events.last(), Some(&ProgressEvent::TaskEnd { task: 3 }));
    let task_numbers: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::TaskStart { task, .. } => Some(*task),
            _ => None,
        })
        .collect();
    assert_eq!(task_numbers, vec![1, 2, 3]);
}

#[cfg(unix)]
#[tokio::test]
async fn preserves_symlinks_and_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    install_sdk(&fx.config, fx.request(&fx.sdk_zip()))
        .await
        .unwrap();

    let sdk = fx.sdk_path();
    let dir_link = sdk.join("node_modules");
    let file_link = sdk.join("manifest-link.json");
    assert!(fs::symlink_metadata(&dir_link).unwrap().file_type().is_symlink());
    assert!(fs::symlink_metadata(&file_link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&dir_link).unwrap(), PathBuf::from("android"));
    assert_eq!(fs::read_link(&file_link).unwrap(), PathBuf::from("manifest.json"));
    assert!(dir_link.join("builder.js").is_file());

    let mode = fs::metadata(sdk.join("titanium")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
}

#[tokio::test]
async fn second_install_requires_overwrite() {
    let fx = Fixture::new();
    let zip = fx.sdk_zip();
    install_sdk(&fx.config, fx.request(&zip)).await.unwrap();

    let err = install_sdk(&fx.config, fx.request(&zip)).await.unwrap_err();
    assert_eq!(err.code(), "EEXIST");
    assert!(err
        .to_string()
        .contains(&fx.sdk_path().display().to_string()));

    let request = InstallRequest {
        overwrite: true,
        ..fx.request(&zip)
    };
    install_sdk(&fx.config, request).await.unwrap();
    let count = fs::read_dir(fx.config.sdk_dir(&fx.root)).unwrap().count();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn reinstall_keeps_modified_bundled_module() {
    let fx = Fixture::new();
    let zip = fx.sdk_zip();
    install_sdk(&fx.config, fx.request(&zip)).await.unwrap();

    let manifest = fx.root.join("modules/android/ti.test/1.0.0/manifest");
    let mut file = fs::OpenOptions::new().append(true).open(&manifest).unwrap();
    file.write_all(b"# local change\n").unwrap();
    drop(file);
    let edited = fs::read_to_string(&manifest).unwrap();

    fs::remove_dir_all(fx.sdk_path()).unwrap();
    install_sdk(&fx.config, fx.request(&zip)).await.unwrap();
    assert_eq!(fs::read_to_string(&manifest).unwrap(), edited);

    let request = InstallRequest {
        overwrite: true,
        ..fx.request(&zip)
    };
    install_sdk(&fx.config, request).await.unwrap();
    assert_eq!(fs::read_to_string(&manifest).unwrap(), MODULE_MANIFEST);
}

#[tokio::test]
async fn rejects_bad_local_files() {
    let fx = Fixture::new();

    let err = install_sdk(&fx.config, fx.request(&fx.tmp.path().join("missing.zip")))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("does not exist"));

    let text = fx.tmp.path().join("sdk.txt");
    fs::write(&text, b"not an archive").unwrap();
    let err = install_sdk(&fx.config, fx.request(&text)).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("is not a zip file"));

    let corrupt = fx.tmp.path().join("corrupt.zip");
    fs::write(&corrupt, b"not an archive").unwrap();
    let err = install_sdk(&fx.config, fx.request(&corrupt)).await.unwrap_err();
    assert_eq!(err.code(), "EZIP");
}

#[tokio::test]
async fn archive_without_sdk_is_rejected() {
    let fx = Fixture::new();
    let zip = fx.tmp.path().join("modules-only.zip");
    write_module_zip(&zip);
    let err = install_sdk(&fx.config, fx.request(&zip)).await.unwrap_err();
    assert_eq!(err.code(), "EZIP");
    assert!(!fx.config.sdk_dir(&fx.root).exists());
}

#[tokio::test]
async fn http_404_carries_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing.zip");
            then.status(404);
        })
        .await;

    let fx = Fixture::new();
    let request = InstallRequest {
        uri: Some(server.url("/missing.zip")),
        download_dir: Some(fx.tmp.path().join("downloads")),
        ..InstallRequest::default()
    };
    let err = install_sdk(&fx.config, request).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.code(), "EHTTP");
}

async fn serve_sdk(server: &MockServer, path: &str, zip: &Path) {
    let body = fs::read(zip).unwrap();
    let path = path.to_string();
    server
        .mock_async(|when, then| {
            when.method(GET).path(path);
            then.status(200).body(body);
        })
        .await;
}

#[tokio::test]
async fn downloads_and_discards_archive_unless_kept() {
    let server = MockServer::start_async().await;
    let fx = Fixture::new();
    let file_name = format!("mobilesdk-0.0.0.GA-{}.zip", platform::os_name());
    serve_sdk(&server, &format!("/dl/{file_name}"), &fx.sdk_zip()).await;
    let downloads = fx.tmp.path().join("downloads");

    let (callback, events) = recorder();
    let request = InstallRequest {
        uri: Some(server.url(format!("/dl/{file_name}"))),
        download_dir: Some(downloads.clone()),
        on_progress: Some(callback),
        ..InstallRequest::default()
    };
    install_sdk(&fx.config, request).await.unwrap();
    assert_eq!(fs::read_dir(&downloads).unwrap().count(), 0);
    match events.lock().unwrap().first() {
        Some(ProgressEvent::Tasks { tasks }) => {
            assert_eq!(tasks.len(), 4);
            assert_eq!(tasks[0], "Downloading SDK");
        }
        other => panic!("unexpected first event: {other:?}"),
    }

    let request = InstallRequest {
        uri: Some(server.url(format!("/dl/{file_name}"))),
        download_dir: Some(downloads.clone()),
        overwrite: true,
        keep: true,
        ..InstallRequest::default()
    };
    install_sdk(&fx.config, request).await.unwrap();
    assert!(downloads.join(&file_name).is_file());
}

fn build_type() -> &'static str {
    if platform::is_64bit() {
        "64bit"
    } else {
        "32bit"
    }
}

#[tokio::test]
async fn installs_latest_release() {
    let server = MockServer::start_async().await;
    let fx = Fixture::with_server(&server);
    let os = platform::os_name();
    let releases = serde_json::json!({
        "releases": [
            { "name": "mobilesdk", "os": os, "build_type": build_type(), "version": "7.5.1.GA", "url": server.url("/old.zip") },
            { "name": "mobilesdk", "os": os, "build_type": build_type(), "version": "8.0.0.GA", "url": server.url("/new.zip") }
        ]
    });
    server
        .mock_async(|when, then| {
            when.method(GET).path("/releases.json");
            then.status(200).json_body(releases);
        })
        .await;
    serve_sdk(&server, "/new.zip", &fx.sdk_zip()).await;

    let request = InstallRequest {
        download_dir: Some(fx.tmp.path().join("downloads")),
        ..InstallRequest::default()
    };
    let sdk = install_sdk(&fx.config, request).await.unwrap();
    assert_eq!(sdk.name, SDK_NAME);
}

#[tokio::test]
async fn installs_ci_build_by_branch_and_hash() {
    let server = MockServer::start_async().await;
    let fx = Fixture::with_server(&server);
    let os = platform::os_name();
    let filename = format!("mobilesdk-0.0.0.v20190304080000-{os}.zip");

    server
        .mock_async(|when, then| {
            when.method(GET).path("/releases.json");
            then.status(200).body(r#"{"releases":[]}"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/branches.json");
            then.status(200)
                .body(r#"{"defaultBranch":"master","branches":["master","7_5_X"]}"#);
        })
        .await;
    let builds = serde_json::json!([
        { "filename": filename.clone(), "git_branch": "master", "git_revision": HASH, "build_type": "mobile" }
    ]);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/master/index.json");
            then.status(200).json_body(builds);
        })
        .await;
    serve_sdk(&server, &format!("/builds/master/{filename}"), &fx.sdk_zip()).await;

    let request = InstallRequest {
        uri: Some(format!("master:{HASH}")),
        download_dir: Some(fx.tmp.path().join("downloads")),
        ..InstallRequest::default()
    };
    let sdk = install_sdk(&fx.config, request).await.unwrap();
    assert_eq!(sdk.path, fx.sdk_path());

    let request = InstallRequest {
        uri: Some("nope:abc".to_string()),
        ..InstallRequest::default()
    };
    let err = install_sdk(&fx.config, request).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Invalid branch \"nope\"");
}

#[tokio::test]
async fn installs_modules_and_plugins() {
    let fx = Fixture::new();
    let zip = fx.tmp.path().join("module.zip");
    write_module_zip(&zip);

    let request = || ModuleInstallRequest {
        uri: zip.to_string_lossy().into_owned(),
        ..ModuleInstallRequest::default()
    };
    let modules = install_module(&fx.config, request()).await.unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].moduleid, "ti.other");
    assert_eq!(modules[0].platform, "ios");
    assert!(fx.root.join("plugins/ti.hook/1.0/hooks/run.js").is_file());

    let installed: Vec<_> = get_installed_modules(&fx.config)
        .await
        .unwrap()
        .into_iter()
        .filter(|m| m.path.starts_with(fx.tmp.path()))
        .collect();
    assert_eq!(installed.len(), 1);

    let err = install_module(&fx.config, request()).await.unwrap_err();
    assert_eq!(err.code(), "EEXIST");

    let overwrite = ModuleInstallRequest {
        overwrite: true,
        ..request()
    };
    assert_eq!(install_module(&fx.config, overwrite).await.unwrap().len(), 1);
}

#[tokio::test]
async fn uninstalls_installed_sdk() {
    let fx = Fixture::new();
    install_sdk(&fx.config, fx.request(&fx.sdk_zip()))
        .await
        .unwrap();

    let removed = uninstall_sdk(SDK_NAME, &fx.config).await.unwrap();
    assert_eq!(removed.len(), 1);
    assert!(!fx.sdk_path().exists());

    let err = uninstall_sdk(SDK_NAME, &fx.config).await.unwrap_err();
    assert_eq!(err.code(), "ENOTFOUND");
}

#[tokio::test]
async fn failed_installs_remove_extraction_dir() {
    let fx = Fixture::new();
    let zip = fx.sdk_zip();
    install_sdk(&fx.config, fx.request(&zip)).await.unwrap();
    assert!(staging_dirs(&fx.root).is_empty());

    let err = install_sdk(&fx.config, fx.request(&zip)).await.unwrap_err();
    assert_eq!(err.code(), "EEXIST");
    assert!(staging_dirs(&fx.root).is_empty());

    let corrupt = fx.tmp.path().join("corrupt.zip");
    fs::write(&corrupt, b"not an archive").unwrap();
    let err = install_sdk(&fx.config, fx.request(&corrupt)).await.unwrap_err();
    assert_eq!(err.code(), "EZIP");
    assert!(staging_dirs(&fx.root).is_empty());

    let request = ModuleInstallRequest {
        uri: corrupt.to_string_lossy().into_owned(),
        ..ModuleInstallRequest::default()
    };
    let err = install_module(&fx.config, request).await.unwrap_err();
    assert_eq!(err.code(), "EZIP");
    assert!(staging_dirs(&fx.root).is_empty());
}

#[tokio::test]
async fn failed_download_install_discards_archive() {
    let server = MockServer::start_async().await;
    let fx = Fixture::new();
    serve_sdk(&server, "/dl/sdk.zip", &fx.sdk_zip()).await;
    install_sdk(&fx.config, fx.request(&fx.sdk_zip()))
        .await
        .unwrap();

    let downloads = fx.tmp.path().join("downloads");
    let request = InstallRequest {
        uri: Some(server.url("/dl/sdk.zip")),
        download_dir: Some(downloads.clone()),
        ..InstallRequest::default()
    };
    let err = install_sdk(&fx.config, request).await.unwrap_err();
    assert_eq!(err.code(), "EEXIST");
    assert_eq!(fs::read_dir(&downloads).unwrap().count(), 0);
    assert!(staging_dirs(&fx.root).is_empty());
}

#[tokio::test]
async fn local_install_ignores_network_settings() {
    let mut fx = Fixture::new();
    fx.config.network = NetworkConfig {
        ca_file: Some(fx.tmp.path().join("missing-ca.pem")),
        ..NetworkConfig::default()
    };

    let sdk = install_sdk(&fx.config, fx.request(&fx.sdk_zip()))
        .await
        .unwrap();
    assert_eq!(sdk.path, fx.sdk_path());

    let zip = fx.tmp.path().join("module.zip");
    write_module_zip(&zip);
    let request = ModuleInstallRequest {
        uri: zip.to_string_lossy().into_owned(),
        ..ModuleInstallRequest::default()
    };
    install_module(&fx.config, request).await.unwrap();

    let request = InstallRequest {
        uri: Some("http://127.0.0.1:9/sdk.zip".to_string()),
        ..InstallRequest::default()
    };
    let err = install_sdk(&fx.config, request).await.unwrap_err();
    assert_eq!(err.code(), "ECONFIG");
}
