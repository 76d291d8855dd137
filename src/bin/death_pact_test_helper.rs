//! Test helper binary for death pact integration tests.
//!
//! Simulates the installer process spawning children with death pact. The
//! test harness spawns this helper, then kills it to verify children die.
//!
//! Usage: `death_pact_test_helper --mode <mode> --pid-file <path> [--count N]`
//!
//! Modes: `spawn-and-wait`, `spawn-and-panic`, `spawn-nested`, `spawn-destructive-sim`.

use std::env;
use std::fs::File;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use rollforge::process_guard::CommandProcessGroup;

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut mode = "spawn-and-wait";
    let mut pid_file = "/tmp/death_pact_pids.txt";
    let mut child_count = 3;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--mode" => {
                mode = args.get(i + 1).map(|s| s.as_str()).unwrap_or(mode);
                i += 2;
            }
            "--pid-file" => {
                pid_file = args.get(i + 1).map(|s| s.as_str()).unwrap_or(pid_file);
                i += 2;
            }
            "--count" => {
                child_count = args.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(child_count);
                i += 2;
            }
            _ => i += 1,
        }
    }

    match mode {
        "spawn-and-wait" => spawn_and_wait(pid_file, child_count),
        "spawn-and-panic" => spawn_and_panic(pid_file, child_count),
        "spawn-nested" => spawn_nested(pid_file),
        "spawn-destructive-sim" => spawn_destructive_simulation(pid_file),
        _ => {
            eprintln!("Unknown mode: {mode}");
            std::process::exit(1);
        }
    }
}

fn spawn_and_wait(pid_file: &str, count: usize) {
    let pids = spawn_children(count);
    write_pids(pid_file, &pids);
    println!("READY");
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}

fn spawn_and_panic(pid_file: &str, count: usize) {
    let pids = spawn_children(count);
    write_pids(pid_file, &pids);
    println!("READY");
    thread::sleep(Duration::from_millis(100));
    panic!("intentional panic for death pact test");
}

fn spawn_nested(pid_file: &str) {
    let nested_pid_file = format!("{pid_file}.nested");

    let parent = Command::new("bash")
        .args([
            "-c",
            &format!(
                r#"
                set -euo pipefail
                CHILD_PIDS=""
                cleanup() {{
                    if [[ -n "$CHILD_PIDS" ]]; then
                        kill $CHILD_PIDS 2>/dev/null || true
                    fi
                    exit 0
                }}
                trap cleanup TERM INT

                sleep 800 &
                PID1=$!
                CHILD_PIDS="$PID1"
                sleep 801 &
                PID2=$!
                CHILD_PIDS="$CHILD_PIDS $PID2"
                sleep 802 &
                PID3=$!
                CHILD_PIDS="$CHILD_PIDS $PID3"

                echo "$PID1 $PID2 $PID3" > "{nested_pid_file}"
                wait
                "#
            ),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .in_new_process_group()
        .spawn()
        .expect("failed to spawn bash parent");

    let parent_pid = parent.id();
    thread::sleep(Duration::from_millis(500));

    let mut grandchild_pids = Vec::new();
    if let Ok(content) = std::fs::read_to_string(&nested_pid_file) {
        for word in content.trim().split_whitespace() {
            if let Ok(pid) = word.parse::<u32>() {
                grandchild_pids.push(pid);
            }
        }
    }
    let _ = std::fs::remove_file(&nested_pid_file);

    let mut all_pids = vec![parent_pid];
    all_pids.extend(grandchild_pids);
    write_pids(pid_file, &all_pids);

    println!("READY");
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}

fn spawn_destructive_simulation(pid_file: &str) {
    let child = Command::new("bash")
        .args([
            "-c",
            r#"
            trap 'echo "SIGTERM received, aborting"; exit 143' TERM
            trap 'echo "SIGINT received, aborting"; exit 130' INT
            for i in $(seq 1 1000); do
                sleep 1
            done
            "#,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .in_new_process_group()
        .spawn()
        .expect("failed to spawn destructive simulation");

    let pid = child.id();
    write_pids(pid_file, &[pid]);
    println!("READY");
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}

fn spawn_children(count: usize) -> Vec<u32> {
    let mut pids = Vec::new();
    for i in 0..count {
        let child = Command::new("sleep")
            .arg(format!("{}", 600 + i))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .in_new_process_group()
            .spawn()
            .expect("failed to spawn sleep child");
        pids.push(child.id());
    }
    thread::sleep(Duration::from_millis(100));
    pids
}

fn write_pids(path: &str, pids: &[u32]) {
    let mut file = File::create(path).expect("failed to create PID file");
    for pid in pids {
        writeln!(file, "{pid}").expect("failed to write PID");
    }
    file.flush().expect("failed to flush PID file");
}
