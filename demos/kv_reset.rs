use std::sync::{Arc, Mutex};
use std::{env, process};
use nvme_kv::kv::{KvChannel, KvDescriptor, KvQueuePair, DEFAULT_REQUEST_POOL_CAPACITY};

/// Reserved keys the original test harness deletes to return a namespace to a known
/// state before a test run.
const RESET_KEYS: [&[u8]; 4] = [b"~TEST_01", b"~TEST_02XX", b"~TEST_03YYYYY", b"~TEST_04"];

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args();
    args.next();

    let pci_addr = match args.next() {
        Some(arg) => arg,
        None => {
            eprintln!("Usage: cargo run --example kv_reset <pci bus id>");
            process::exit(1);
        }
    };

    let mut nvme = nvme_kv::new_pci_and_huge(&pci_addr)?;

    let namespace_id = nvme.namespace_ids().first().copied().expect("No namespaces exist.");
    let queue_capacity = nvme
        .controller_information()
        .maximum_queue_entries_supported;
    let io_queue_pair = nvme.create_io_queue_pair(namespace_id, queue_capacity)?;
    let kv_queue_pair = KvQueuePair::new(io_queue_pair, DEFAULT_REQUEST_POOL_CAPACITY);
    let mut channel = KvChannel::new(kv_queue_pair);
    let descriptor = KvDescriptor::read_write();

    let pending = Arc::new(Mutex::new(RESET_KEYS.len()));
    for key in RESET_KEYS {
        let pending = pending.clone();
        channel.kv_delete(
            &descriptor,
            key,
            Box::new(move |record| {
                if !record.is_success() {
                    eprintln!(
                        "delete of reserved test key failed with status 0x{:X}",
                        record.status_code
                    );
                }
                *pending.lock().unwrap() -= 1;
            }),
        )?;
    }

    while *pending.lock().unwrap() > 0 {
        channel.drain_completions();
    }

    let io_queue_pair = channel.into_queue_pair().into_inner();
    nvme.delete_io_queue_pair(io_queue_pair)?;

    println!("reset complete: {} reserved keys deleted", RESET_KEYS.len());
    Ok(())
}
