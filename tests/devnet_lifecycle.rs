//! Devnet lifecycle integration tests
//!
//! Nodes are shell stubs; their RPC endpoints are simulated by plain TCP
//! listeners serving a canned status response, so health checking runs
//! against real sockets.

#![cfg(unix)]

use hydra::config::Config;
use hydra::devnet::{
    DevnetOrchestrator, DevnetStatus, NodeStatus, ProvisionOptions, VersionSource,
};
use hydra::plugin::PLUGIN_PREFIX;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tempfile::TempDir;

fn install_executable(path: &Path, script: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, script).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn install_plugin(plugin_dir: &Path) {
    install_executable(
        &plugin_dir.join(format!("{PLUGIN_PREFIX}demo")),
        "#!/bin/sh\n\
         case \"$1\" in\n\
         describe)\n\
         printf '{\"name\":\"demo\",\"binary_name\":\"demod\",\
         \"build\":{\"repo\":\"https://example.com/demo.git\",\
         \"command\":\"make build\",\"artifact\":\"build/demod\"}}'\n\
         ;;\n\
         genesis)\n\
         shift; home=$2; echo '{\"app_state\":{}}' > \"$home/genesis.json\"\n\
         ;;\n\
         esac\n",
    );
}

/// Node binary that just idles; `sh` exits on SIGTERM
fn install_node_binary(dir: &Path) -> PathBuf {
    let path = dir.join("demod");
    install_executable(&path, "#!/bin/sh\necho booting\nsleep 120\n");
    path
}

/// Serve a canned JSON status response on an already-bound listener
fn serve_status(listener: TcpListener) -> mpsc::Sender<()> {
    let (tx, rx) = mpsc::channel::<()>();
    std::thread::spawn(move || {
        listener.set_nonblocking(true).unwrap();
        let body = r#"{"result":{"sync_info":{"catching_up":false}}}"#;
        loop {
            if rx.try_recv().is_ok() {
                return;
            }
            match listener.accept() {
                Ok((mut stream, _)) => {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes());
                }
                Err(_) => std::thread::sleep(Duration::from_millis(10)),
            }
        }
    });
    tx
}

/// Find `count` consecutive free ports and bind them
fn bind_consecutive(count: u16) -> Vec<TcpListener> {
    for _ in 0..50 {
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = probe.local_addr().unwrap().port();
        drop(probe);

        let listeners: Vec<TcpListener> = (0..count)
            .map_while(|i| TcpListener::bind(("127.0.0.1", base + i)).ok())
            .collect();
        if listeners.len() == usize::from(count) {
            return listeners;
        }
    }
    panic!("could not find {count} consecutive free ports");
}

fn test_config(temp: &TempDir, rpc_base: u16) -> Config {
    let mut config = Config::default();
    config.cache.dir = Some(temp.path().join("cache"));
    config.plugins.dir = Some(temp.path().join("plugins"));
    config.devnet.home_root = Some(temp.path().join("devnets"));
    config.ports.rpc_base = rpc_base;
    config.ports.rpc_stride = 1;
    config.ports.evm_base = 18545;
    config.health.timeout_secs = 3;
    config.health.poll_interval_ms = 100;
    config.health.attempt_timeout_secs = 1;
    config.stop.poll_interval_ms = 50;
    config
}

fn provision_opts(temp: &TempDir, binary: PathBuf, validators: u8) -> ProvisionOptions {
    ProvisionOptions {
        home: temp.path().join("devnets").join("demo"),
        plugin: "demo".to_string(),
        network: "testnet".to_string(),
        validators,
        version: VersionSource::LocalBinary(binary),
        chain_id: None,
        mode: None,
        image: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn provision_run_stop_run_reuses_state() {
    let temp = TempDir::new().unwrap();
    install_plugin(&temp.path().join("plugins"));
    let binary = install_node_binary(temp.path());

    let mut listeners = bind_consecutive(2);
    let rpc_base = listeners[0].local_addr().unwrap().port();
    let _s1 = serve_status(listeners.remove(0));
    let _s2 = serve_status(listeners.remove(0));

    let orchestrator = DevnetOrchestrator::new(test_config(&temp, rpc_base));

    // Provision
    let devnet = orchestrator
        .provision(provision_opts(&temp, binary, 2))
        .await
        .unwrap();
    assert_eq!(devnet.status, DevnetStatus::Provisioned);
    let home = devnet.home().to_path_buf();

    let seed_of = |i: u8| std::fs::read_to_string(home.join(format!("node{i}/node_seed"))).unwrap();
    let seeds_before = (seed_of(0), seed_of(1));
    let genesis_before = std::fs::read_to_string(home.join("genesis.json")).unwrap();

    // Run: both nodes healthy
    let report = orchestrator.run(&home).await.unwrap();
    assert_eq!(report.successful, vec![0, 1]);
    assert!(report.failed.is_empty());
    assert!(report.all_healthy);

    let running = orchestrator.load_metadata(&home).await.unwrap();
    assert_eq!(running.status, DevnetStatus::Running);
    assert!(running.nodes.iter().all(|n| n.handle.is_some()));

    // Stop: both nodes exit on the graceful signal
    let report = orchestrator.stop(&home, Duration::from_secs(30)).await.unwrap();
    assert_eq!(report.stopped, vec![0, 1]);
    assert!(report.forced.is_empty());
    assert!(report.failed.is_empty());

    let stopped = orchestrator.load_metadata(&home).await.unwrap();
    assert_eq!(stopped.status, DevnetStatus::Stopped);
    assert!(stopped.nodes.iter().all(|n| n.status == NodeStatus::Stopped));

    // Stop again: idempotent
    let report = orchestrator.stop(&home, Duration::from_secs(5)).await.unwrap();
    assert_eq!(report.stopped, vec![0, 1]);

    // Run again: node directories and key material are reused as-is
    let report = orchestrator.run(&home).await.unwrap();
    assert!(report.all_healthy);

    assert_eq!((seed_of(0), seed_of(1)), seeds_before);
    assert_eq!(
        std::fs::read_to_string(home.join("genesis.json")).unwrap(),
        genesis_before
    );

    orchestrator.stop(&home, Duration::from_secs(30)).await.unwrap();
    orchestrator.destroy(&home).await.unwrap();
    assert!(!home.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn unhealthy_node_does_not_fail_siblings() {
    let temp = TempDir::new().unwrap();
    install_plugin(&temp.path().join("plugins"));
    let binary = install_node_binary(temp.path());

    let mut listeners = bind_consecutive(2);
    let rpc_base = listeners[0].local_addr().unwrap().port();
    // Only node 0 gets a status endpoint; node 1's port stays silent
    let _s1 = serve_status(listeners.remove(0));
    drop(listeners);

    let orchestrator = DevnetOrchestrator::new(test_config(&temp, rpc_base));
    let devnet = orchestrator
        .provision(provision_opts(&temp, binary, 2))
        .await
        .unwrap();

    let report = orchestrator.run(devnet.home()).await.unwrap();
    assert_eq!(report.successful, vec![0]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert!(!report.all_healthy);
    // The failed node's output is attached to the report
    assert!(report.failed[0].log_tail.contains("booting"));

    // One healthy node is enough to be running
    let running = orchestrator.load_metadata(devnet.home()).await.unwrap();
    assert_eq!(running.status, DevnetStatus::Running);
    assert_eq!(running.nodes[0].status, NodeStatus::Running);
    assert_eq!(running.nodes[1].status, NodeStatus::Failed);

    orchestrator
        .stop(devnet.home(), Duration::from_secs(30))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_healthy_nodes_leaves_status_unchanged() {
    let temp = TempDir::new().unwrap();
    install_plugin(&temp.path().join("plugins"));
    let binary = install_node_binary(temp.path());

    // No status servers at all
    let listeners = bind_consecutive(2);
    let rpc_base = listeners[0].local_addr().unwrap().port();
    drop(listeners);

    let orchestrator = DevnetOrchestrator::new(test_config(&temp, rpc_base));
    let devnet = orchestrator
        .provision(provision_opts(&temp, binary, 2))
        .await
        .unwrap();

    let report = orchestrator.run(devnet.home()).await.unwrap();
    assert!(report.successful.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(!report.all_healthy);

    let reloaded = orchestrator.load_metadata(devnet.home()).await.unwrap();
    assert_eq!(reloaded.status, DevnetStatus::Provisioned);

    orchestrator
        .stop(devnet.home(), Duration::from_secs(30))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn deaf_node_is_force_killed_within_deadline() {
    let temp = TempDir::new().unwrap();
    install_plugin(&temp.path().join("plugins"));

    // node0 ignores SIGTERM; every other node exits promptly
    let binary = temp.path().join("demod");
    install_executable(
        &binary,
        "#!/bin/sh\n\
         case \"$3\" in\n\
         */node0) trap '' TERM; while :; do sleep 1; done ;;\n\
         *) sleep 120 ;;\n\
         esac\n",
    );

    let listeners = bind_consecutive(2);
    let rpc_base = listeners[0].local_addr().unwrap().port();
    drop(listeners);

    let mut config = test_config(&temp, rpc_base);
    config.health.timeout_secs = 1;
    let orchestrator = DevnetOrchestrator::new(config);

    let devnet = orchestrator
        .provision(provision_opts(&temp, binary, 2))
        .await
        .unwrap();

    // Health fails (no endpoints), but both processes are up and their
    // handles recorded
    let report = orchestrator.run(devnet.home()).await.unwrap();
    assert_eq!(report.failed.len(), 2);
    let with_handles = orchestrator.load_metadata(devnet.home()).await.unwrap();
    assert!(with_handles.nodes.iter().all(|n| n.handle.is_some()));

    let started = std::time::Instant::now();
    let report = orchestrator
        .stop(devnet.home(), Duration::from_secs(2))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.stopped, vec![1]);
    assert_eq!(report.forced, vec![0]);
    assert!(report.failed.is_empty());
    // Deadline plus a little slack, not the deaf node's sleep loop
    assert!(elapsed < Duration::from_secs(6), "stop took {elapsed:?}");

    orchestrator.destroy(devnet.home()).await.unwrap();
}

#[tokio::test]
async fn provision_yields_exactly_n_nodes_for_valid_counts() {
    for n in 1..=4u8 {
        let temp = TempDir::new().unwrap();
        install_plugin(&temp.path().join("plugins"));
        let binary = install_node_binary(temp.path());
        let orchestrator = DevnetOrchestrator::new(test_config(&temp, 26657));

        let devnet = orchestrator
            .provision(provision_opts(&temp, binary, n))
            .await
            .unwrap();

        assert_eq!(devnet.nodes.len(), usize::from(n));
        let node_dirs = std::fs::read_dir(devnet.home())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("node")
            })
            .count();
        assert_eq!(node_dirs, usize::from(n));
    }
}
