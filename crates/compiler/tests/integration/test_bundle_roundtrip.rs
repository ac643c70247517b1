//! Integration tests for bundle packaging, loading and dependency resolution
//!
//! Bundles here wrap a small shell script standing in for a compiled flow,
//! so the loader's extraction, handshake and exit-code handling can be
//! exercised without a toolchain. The full compile-and-run round trip needs
//! cargo and is ignored by default.

use etlflow_compiler::bundle::{
    self, write_bundle, BundleContents, Manifest, FLOW_BINARY, FLOW_CLASS, FLOW_SHA256, MAIN_CLASS,
};
use etlflow_compiler::{
    BuildConfig, BundleLoader, DependencyResolver, Error, PipelineGraph,
};
use etlflow_runtime::flow::{CONTEXT_TYPE, ENTRY_METHOD, RUNTIME_ABI};
use etlflow_runtime::{DependencySpec, FlowDescriptor};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const FLOW: &str = "etlflow_generated::FlowA";

fn descriptor_json(flow_type: &str, runtime_abi: &str) -> String {
    serde_json::to_string(&FlowDescriptor {
        flow_type: flow_type.to_string(),
        entry_method: ENTRY_METHOD.to_string(),
        context_type: CONTEXT_TYPE.to_string(),
        runtime_abi: runtime_abi.to_string(),
    })
    .unwrap()
}

/// A stand-in flow binary: answers `--describe`, otherwise checks the
/// loader's environment and exits with `run_exit`
fn fake_flow(dir: &Path, describe: &str, run_exit: i32) -> PathBuf {
    let path = dir.join("flow_a");
    let script = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"--describe\" ]; then echo '{describe}'; exit 0; fi\n\
         [ \"$ETLFLOW_FLOW_CLASS\" = \"{FLOW}\" ] || exit 3\n\
         [ -d \"$ETLFLOW_BUNDLE_DIR\" ] || exit 1\n\
         exit {run_exit}\n"
    );
    std::fs::write(&path, script).unwrap();
    path
}

fn nested_zip(path: &Path) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    zip.start_file("res/greeting.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"hello").unwrap();
    zip.finish().unwrap();
}

fn nested_tar(path: &Path) {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    let data = b"native";
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, "libnative.txt", &data[..]).unwrap();
    builder.finish().unwrap();
}

fn build_bundle(dir: &Path, binary: PathBuf, libraries: Vec<PathBuf>) -> PathBuf {
    let out = dir.join("flow.bundle");
    write_bundle(
        &out,
        &BundleContents {
            flow_class: FLOW.to_string(),
            created_by: "etlflow flow compiler test".to_string(),
            binary,
            binary_name: "flow_a".to_string(),
            source: "fn main() {}\n".to_string(),
            libraries,
        },
    )
    .unwrap();
    out
}

/// Write a bundle whose manifest is exactly `manifest`
fn raw_bundle(dir: &Path, manifest: &str) -> PathBuf {
    let out = dir.join("raw.bundle");
    let mut builder = tar::Builder::new(File::create(&out).unwrap());
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    builder
        .append_data(&mut header, bundle::MANIFEST_PATH, manifest.as_bytes())
        .unwrap();
    let binary = b"#!/bin/sh\nexit 0\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(binary.len() as u64);
    header.set_mode(0o755);
    builder.append_data(&mut header, "bin/flow_a", &binary[..]).unwrap();
    builder.finish().unwrap();
    out
}

#[test]
fn test_open_reads_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_flow(dir.path(), &descriptor_json(FLOW, RUNTIME_ABI), 0);
    let path = build_bundle(dir.path(), binary, Vec::new());

    let loader = BundleLoader::open(&path).unwrap();
    assert_eq!(loader.flow_class(), FLOW);
    assert_eq!(
        loader.manifest().get(MAIN_CLASS),
        Some(etlflow_runtime::launcher::LAUNCHER_ID)
    );
    assert_ne!(loader.manifest().get(MAIN_CLASS), Some(FLOW));
}

#[test]
fn test_missing_manifest_attribute_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = raw_bundle(
        dir.path(),
        "Manifest-Version: 1.0\nMain-Class: etlflow_runtime::launcher\nFlow-Binary: bin/flow_a\n",
    );
    let err = BundleLoader::open(&path).unwrap_err();
    assert!(matches!(&err, Error::Load(msg) if msg.contains(FLOW_CLASS)), "{err}");
}

#[test]
fn test_foreign_launcher_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = raw_bundle(
        dir.path(),
        "Main-Class: com.example.Main\nFlow-Class: etlflow_generated::FlowA\n",
    );
    assert!(matches!(BundleLoader::open(&path), Err(Error::Load(_))));
}

#[test]
fn test_not_a_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.bundle");
    std::fs::write(&path, b"definitely not a tar archive").unwrap();
    assert!(matches!(BundleLoader::open(&path), Err(Error::Load(_))));
    assert!(matches!(
        BundleLoader::open(dir.path().join("missing.bundle")),
        Err(Error::Load(_))
    ));
}

#[test]
fn test_checksum_mismatch_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut manifest = Manifest::new();
    manifest.set(MAIN_CLASS, etlflow_runtime::launcher::LAUNCHER_ID);
    manifest.set(FLOW_CLASS, FLOW);
    manifest.set(FLOW_BINARY, "bin/flow_a");
    manifest.set(FLOW_SHA256, "00".repeat(32));
    let path = raw_bundle(dir.path(), &manifest.render());

    let loader = BundleLoader::open(&path).unwrap();
    let err = loader.extract().unwrap_err();
    assert!(matches!(&err, Error::Load(msg) if msg.contains("checksum")), "{err}");
}

#[test]
fn test_nested_archives_are_extracted_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_flow(dir.path(), &descriptor_json(FLOW, RUNTIME_ABI), 0);
    let jar = dir.path().join("greeter-1.0.jar");
    nested_zip(&jar);
    let tarball = dir.path().join("native-2.0.tar");
    nested_tar(&tarball);
    let path = build_bundle(dir.path(), binary, vec![jar, tarball]);

    let extracted = BundleLoader::open(&path).unwrap().extract().unwrap();
    let lib = extracted.root().join("lib");
    assert_eq!(
        extracted.lib_dirs(),
        &[lib.clone(), lib.join("greeter-1.0"), lib.join("native-2.0")]
    );

    let loading = extracted.loading_context();
    assert_eq!(
        loading.resolve("res/greeting.txt"),
        Some(lib.join("greeter-1.0").join("res/greeting.txt"))
    );
    assert_eq!(
        std::fs::read_to_string(loading.resolve("libnative.txt").unwrap()).unwrap(),
        "native"
    );
    // The bundle's own files come first
    assert_eq!(
        loading.resolve("src/main.rs"),
        Some(extracted.root().join("src/main.rs"))
    );
}

#[test]
fn test_corrupt_nested_archive_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_flow(dir.path(), &descriptor_json(FLOW, RUNTIME_ABI), 0);
    let broken = dir.path().join("broken-1.0.jar");
    std::fs::write(&broken, b"PK\x03\x04 truncated").unwrap();
    let path = build_bundle(dir.path(), binary, vec![broken]);

    let err = BundleLoader::open(&path).unwrap().extract().unwrap_err();
    assert!(matches!(&err, Error::Load(msg) if msg.contains("broken-1.0.jar")), "{err}");
}

#[cfg(unix)]
#[tokio::test]
async fn test_describe_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_flow(dir.path(), &descriptor_json(FLOW, RUNTIME_ABI), 0);
    let path = build_bundle(dir.path(), binary, Vec::new());

    let extracted = BundleLoader::open(&path).unwrap().extract().unwrap();
    let descriptor = extracted.describe().await.unwrap();
    assert_eq!(descriptor.flow_type, FLOW);
    extracted.run(Some(16), false).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_descriptor_mismatch_is_context_mismatch() {
    for describe in [
        descriptor_json("etlflow_generated::FlowB", RUNTIME_ABI),
        descriptor_json(FLOW, "0.0.0-other"),
        "not json".to_string(),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_flow(dir.path(), &describe, 0);
        let path = build_bundle(dir.path(), binary, Vec::new());
        let extracted = BundleLoader::open(&path).unwrap().extract().unwrap();
        let err = extracted.describe().await.unwrap_err();
        assert!(matches!(err, Error::ContextMismatch(_)), "{describe}: {err}");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_run_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let binary = fake_flow(dir.path(), &descriptor_json(FLOW, RUNTIME_ABI), 3);
    let path = build_bundle(dir.path(), binary, Vec::new());
    let extracted = BundleLoader::open(&path).unwrap().extract().unwrap();
    assert!(matches!(
        extracted.run(None, false).await,
        Err(Error::ContextMismatch(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    let binary = fake_flow(dir.path(), &descriptor_json(FLOW, RUNTIME_ABI), 1);
    let path = build_bundle(dir.path(), binary, Vec::new());
    let extracted = BundleLoader::open(&path).unwrap().extract().unwrap();
    assert!(matches!(extracted.run(None, false).await, Err(Error::Runtime(_))));
}

fn offline_resolver(cache: &Path) -> DependencyResolver {
    let config = BuildConfig {
        dependency_cache: cache.to_path_buf(),
        // Discard port; nothing listens here
        repository_url: "http://127.0.0.1:9/maven2".to_string(),
        download_timeout_seconds: 2,
        ..BuildConfig::default()
    };
    DependencyResolver::new(&config).unwrap()
}

#[tokio::test]
async fn test_unreachable_optional_dependency_is_skipped() {
    let cache = tempfile::tempdir().unwrap();
    let csv = DependencySpec::new("org.apache.commons", "commons-csv", "1.10.0").optional();

    let resolved = offline_resolver(cache.path()).resolve(&[csv.clone()]).await.unwrap();
    assert!(resolved.resolved.is_empty());
    assert_eq!(resolved.skipped_optional, vec![csv]);
}

#[tokio::test]
async fn test_unreachable_required_dependency_fails() {
    let cache = tempfile::tempdir().unwrap();
    let present = DependencySpec::new("org.example", "present", "1.0");
    let cached = cache.path().join(present.repository_path());
    std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
    std::fs::write(&cached, b"jar").unwrap();
    let absent = DependencySpec::new("org.example", "absent", "1.0");

    let err = offline_resolver(cache.path())
        .resolve(&[present, absent])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Dependency(msg) if msg.contains("org.example:absent:1.0")));
}

/// Compiles the same sheet twice with cargo and runs both bundles;
/// run with `cargo test -- --ignored`
#[tokio::test]
#[ignore]
async fn test_compile_and_run_round_trip() {
    use etlflow_compiler::{BuildOrchestrator, BuildProfile};
    use etlflow_components::ComponentRegistry;

    let out = tempfile::tempdir().unwrap();
    let csv = out.path().join("rows.csv");
    let sheet = serde_json::json!({
        "id": "round-trip",
        "name": "Round trip",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "seq", "type": "source", "data": {"componentData": {
                "id": "sequence-source",
                "implementationClass": "sequence-source",
                "parameters": [{"name": "count", "value": 4, "parameterType": "number"}]
            }}},
            {"id": "flt", "type": "transform", "data": {"componentData": {
                "id": "filter",
                "implementationClass": "filter",
                "parameters": [{"name": "condition", "value": "value > 1", "parameterType": "string"}]
            }}},
            {"id": "csv", "type": "destination", "data": {"componentData": {
                "id": "csv-destination",
                "implementationClass": "csv-destination",
                "parameters": [{"name": "filepath", "value": csv.to_string_lossy(), "parameterType": "string"}]
            }}},
            {"id": "stop", "type": "stop"}
        ],
        "edges": [
            {"id": "c1", "source": "start", "target": "seq", "sourceHandle": "control-flow-out"},
            {"id": "d1", "source": "seq", "target": "flt", "sourceHandle": "data-out"},
            {"id": "d2", "source": "flt", "target": "csv", "sourceHandle": "data-out"},
            {"id": "c2", "source": "seq", "target": "stop", "sourceHandle": "control-flow-out"}
        ]
    });
    let graph = PipelineGraph::from_value(sheet).unwrap();
    let config = BuildConfig {
        profile: BuildProfile::Debug,
        ..BuildConfig::default()
    };
    let orchestrator = BuildOrchestrator::new(config, ComponentRegistry::with_builtins());

    let mut runs = Vec::new();
    for name in ["first.bundle", "second.bundle"] {
        let output = orchestrator
            .compile(&graph, &out.path().join(name))
            .await
            .unwrap();
        let extracted = BundleLoader::open(&output.bundle_path)
            .unwrap()
            .extract()
            .unwrap();
        let descriptor = extracted.describe().await.unwrap();
        extracted.run(None, false).await.unwrap();

        // The destination stops at the terminator, so the file holds
        // every data row and nothing after it
        let written = std::fs::read_to_string(&csv).unwrap();
        std::fs::remove_file(&csv).unwrap();
        runs.push((descriptor.flow_type, written));
    }

    assert_eq!(runs[0].0, "etlflow_generated::FlowRoundTrip");
    assert_eq!(runs[0].1, "value\n2\n3\n4\n");
    assert_eq!(runs[0], runs[1]);
}
