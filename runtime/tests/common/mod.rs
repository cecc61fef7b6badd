//! Shared test helpers: inline WAT guests and socket plumbing.
//!
//! The relay guests are complete v0 WATMs: they register the cancel
//! descriptor, enter a role, and run a fair poll-driven byte relay over
//! `fd_read`/`fd_write`/`poll_oneoff`. Memory layout (one page):
//! poll subscriptions at 8 (48 bytes each), events at 160 (32 bytes each),
//! nevents at 256, the scratch iovec at 264, nread/nwritten at 272, and a
//! 16 KiB data buffer at 1024.

#![allow(dead_code)]

use std::io::Read;

use water_runtime::WatmConfig;

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config_for(wat: &str) -> WatmConfig {
    WatmConfig::new(wat.as_bytes().to_vec())
}

/// Read until `n` bytes or EOF. Callers put a read timeout on the socket so
/// a broken relay fails the test instead of hanging it.
pub fn read_n(conn: &mut impl Read, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    let mut got = 0;
    while got < n {
        match conn.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(k) => got += k,
            Err(e) => panic!("read failed after {got}/{n} bytes: {e}"),
        }
    }
    buf.truncate(got);
    buf
}

/// Which role entry a relay guest exports.
#[derive(Clone, Copy, Debug)]
pub enum GuestRole {
    Dial,
    Accept,
    Associate,
}

/// A complete v0 relay WATM.
///
/// `reverse` makes the worker reverse each chunk in place before forwarding
/// (the byte-reverse transport); otherwise it is the identity transport.
pub fn relay_guest(role: GuestRole, reverse: bool) -> String {
    let (imports, entry) = match role {
        GuestRole::Dial => (
            r#"(import "env" "host_dial" (func $host_dial (result i32)))"#,
            r#"
  (func (export "_water_dial") (param $caller i32) (result i32)
    (local $fd i32)
    (global.set $side_a (local.get $caller))
    (local.set $fd (call $host_dial))
    (if (i32.lt_s (local.get $fd) (i32.const 0))
      (then (return (local.get $fd))))
    (global.set $side_b (local.get $fd))
    (local.get $fd))
"#,
        ),
        GuestRole::Accept => (
            r#"(import "env" "host_accept" (func $host_accept (result i32)))"#,
            r#"
  (func (export "_water_accept") (param $caller i32) (result i32)
    (local $fd i32)
    (global.set $side_a (local.get $caller))
    (local.set $fd (call $host_accept))
    (if (i32.lt_s (local.get $fd) (i32.const 0))
      (then (return (local.get $fd))))
    (global.set $side_b (local.get $fd))
    (local.get $fd))
"#,
        ),
        GuestRole::Associate => (
            r#"(import "env" "host_dial" (func $host_dial (result i32)))
  (import "env" "host_accept" (func $host_accept (result i32)))"#,
            r#"
  (func (export "_water_associate") (result i32)
    (local $fd i32)
    (local.set $fd (call $host_accept))
    (if (i32.lt_s (local.get $fd) (i32.const 0))
      (then (return (local.get $fd))))
    (global.set $side_a (local.get $fd))
    (local.set $fd (call $host_dial))
    (if (i32.lt_s (local.get $fd) (i32.const 0))
      (then (return (local.get $fd))))
    (global.set $side_b (local.get $fd))
    (i32.const 0))
"#,
        ),
    };

    let reverse_hook = if reverse {
        "(call $revbuf (local.get $n))"
    } else {
        ""
    };

    format!(
        r#"(module
  {imports}
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "poll_oneoff"
    (func $poll_oneoff (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (global $cancel_fd (mut i32) (i32.const -1))
  (global $side_a (mut i32) (i32.const -1))
  (global $side_b (mut i32) (i32.const -1))

  (func (export "_water_v0"))
  (func (export "_water_init") (result i32) (i32.const 0))
  (func (export "_water_cancel_with") (param $fd i32) (result i32)
    (global.set $cancel_fd (local.get $fd))
    (i32.const 0))
{entry}
  ;; one fd_read subscription at 8 + idx*48
  (func $sub (param $idx i32) (param $ud i64) (param $fd i32)
    (local $base i32)
    (local.set $base
      (i32.add (i32.const 8) (i32.mul (local.get $idx) (i32.const 48))))
    (i64.store (local.get $base) (local.get $ud))
    (i32.store8 (i32.add (local.get $base) (i32.const 8)) (i32.const 1))
    (i32.store (i32.add (local.get $base) (i32.const 16)) (local.get $fd)))

  ;; reverse buffer[1024 .. 1024+n] in place
  (func $revbuf (param $n i32)
    (local $i i32) (local $j i32) (local $t i32)
    (local.set $i (i32.const 1024))
    (local.set $j
      (i32.sub (i32.add (i32.const 1024) (local.get $n)) (i32.const 1)))
    (block $done
      (loop $swap
        (br_if $done (i32.ge_s (local.get $i) (local.get $j)))
        (local.set $t (i32.load8_u (local.get $i)))
        (i32.store8 (local.get $i) (i32.load8_u (local.get $j)))
        (i32.store8 (local.get $j) (local.get $t))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (local.set $j (i32.sub (local.get $j) (i32.const 1)))
        (br $swap))))

  ;; move one chunk src -> dst: 0 ok, 1 clean EOF, negative -errno
  (func $copy (param $src i32) (param $dst i32) (result i32)
    (local $e i32) (local $n i32) (local $off i32)
    (i32.store (i32.const 264) (i32.const 1024))
    (i32.store (i32.const 268) (i32.const 16384))
    (local.set $e
      (call $fd_read (local.get $src) (i32.const 264) (i32.const 1) (i32.const 272)))
    (if (local.get $e)
      (then (return (i32.sub (i32.const 0) (local.get $e)))))
    (local.set $n (i32.load (i32.const 272)))
    (if (i32.eqz (local.get $n)) (then (return (i32.const 1))))
    {reverse_hook}
    (local.set $off (i32.const 0))
    (block $done
      (loop $write
        (br_if $done (i32.ge_u (local.get $off) (local.get $n)))
        (i32.store (i32.const 264) (i32.add (i32.const 1024) (local.get $off)))
        (i32.store (i32.const 268) (i32.sub (local.get $n) (local.get $off)))
        (local.set $e
          (call $fd_write (local.get $dst) (i32.const 264) (i32.const 1) (i32.const 272)))
        (if (local.get $e)
          (then (return (i32.sub (i32.const 0) (local.get $e)))))
        (local.set $off (i32.add (local.get $off) (i32.load (i32.const 272))))
        (br $write)))
    (i32.const 0))

  ;; fair relay: poll cancel + both sides, one read per ready side per round
  (func (export "_water_worker") (result i32)
    (local $e i32) (local $i i32) (local $nev i32) (local $r i32) (local $ud i64)
    (call $sub (i32.const 0) (i64.const 0) (global.get $cancel_fd))
    (call $sub (i32.const 1) (i64.const 1) (global.get $side_a))
    (call $sub (i32.const 2) (i64.const 2) (global.get $side_b))
    (loop $main
      (local.set $e
        (call $poll_oneoff (i32.const 8) (i32.const 160) (i32.const 3) (i32.const 256)))
      (if (local.get $e)
        (then (return (i32.sub (i32.const 0) (local.get $e)))))
      (local.set $nev (i32.load (i32.const 256)))
      (local.set $i (i32.const 0))
      (block $done
        (loop $each
          (br_if $done (i32.ge_u (local.get $i) (local.get $nev)))
          (local.set $ud
            (i64.load (i32.add (i32.const 160) (i32.mul (local.get $i) (i32.const 32)))))
          (if (i64.eqz (local.get $ud))
            (then (return (i32.const -11))))
          (if (i64.eq (local.get $ud) (i64.const 1))
            (then (local.set $r (call $copy (global.get $side_a) (global.get $side_b))))
            (else (local.set $r (call $copy (global.get $side_b) (global.get $side_a)))))
          (if (i32.eq (local.get $r) (i32.const 1))
            (then (return (i32.const 0))))
          (if (i32.lt_s (local.get $r) (i32.const 0))
            (then (return (local.get $r))))
          (local.set $i (i32.add (local.get $i) (i32.const 1)))
          (br $each)))
      (br $main))
    (i32.const 0))
)
"#
    )
}

/// A guest whose worker blocks forever on the cancel descriptor; its dialer
/// entry hands the caller descriptor straight back instead of dialing out.
pub const STUCK_GUEST: &str = r#"(module
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (global $cancel_fd (mut i32) (i32.const -1))
  (func (export "_water_v0"))
  (func (export "_water_init") (result i32) (i32.const 0))
  (func (export "_water_cancel_with") (param $fd i32) (result i32)
    (global.set $cancel_fd (local.get $fd))
    (i32.const 0))
  (func (export "_water_dial") (param $caller i32) (result i32)
    (local.get $caller))
  (func (export "_water_worker") (result i32)
    (local $e i32)
    (i32.store (i32.const 264) (i32.const 1024))
    (i32.store (i32.const 268) (i32.const 64))
    (local.set $e
      (call $fd_read (global.get $cancel_fd) (i32.const 264) (i32.const 1) (i32.const 272)))
    (if (local.get $e)
      (then (return (i32.sub (i32.const 0) (local.get $e)))))
    (i32.const -11))
)
"#;

/// `_water_init` pulls the config blob and compares it against `expected`.
/// Returns 0 on a match, `-EINVAL` otherwise.
pub fn config_checking_guest(expected: &[u8]) -> String {
    let escaped: String = expected
        .iter()
        .map(|b| format!("\\{:02x}", b))
        .collect();
    format!(
        r#"(module
  (import "env" "pull_config" (func $pull_config (result i32)))
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 4096) "{escaped}")
  (func (export "_water_v0"))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
  (func (export "_water_worker") (result i32) (i32.const 0))
  (func (export "_water_init") (result i32)
    (local $fd i32) (local $e i32) (local $n i32) (local $i i32)
    (local.set $fd (call $pull_config))
    (if (i32.lt_s (local.get $fd) (i32.const 0))
      (then (return (local.get $fd))))
    (i32.store (i32.const 264) (i32.const 1024))
    (i32.store (i32.const 268) (i32.const 512))
    (local.set $e
      (call $fd_read (local.get $fd) (i32.const 264) (i32.const 1) (i32.const 272)))
    (if (local.get $e)
      (then (return (i32.sub (i32.const 0) (local.get $e)))))
    (local.set $n (i32.load (i32.const 272)))
    (if (i32.ne (local.get $n) (i32.const {len}))
      (then (return (i32.const -28))))
    (local.set $i (i32.const 0))
    (block $done
      (loop $cmp
        (br_if $done (i32.ge_u (local.get $i) (local.get $n)))
        (if (i32.ne
              (i32.load8_u (i32.add (i32.const 1024) (local.get $i)))
              (i32.load8_u (i32.add (i32.const 4096) (local.get $i))))
          (then (return (i32.const -28))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $cmp)))
    (i32.const 0))
)
"#,
        escaped = escaped,
        len = expected.len(),
    )
}

/// `_water_init` expects `pull_config` to answer `-ENOENT`.
pub const NO_CONFIG_GUEST: &str = r#"(module
  (import "env" "pull_config" (func $pull_config (result i32)))
  (func (export "_water_v0"))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
  (func (export "_water_worker") (result i32) (i32.const 0))
  (func (export "_water_init") (result i32)
    (if (i32.eq (call $pull_config) (i32.const -44))
      (then (return (i32.const 0))))
    (i32.const -28))
)
"#;

/// `_water_init` reports `-EINVAL`.
pub const INIT_FAILING_GUEST: &str = r#"(module
  (func (export "_water_v0"))
  (func (export "_water_init") (result i32) (i32.const -28))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
  (func (export "_water_worker") (result i32) (i32.const 0))
)
"#;

/// `_water_cancel_with` refuses with `-EPERM`.
pub const CANCEL_REFUSING_GUEST: &str = r#"(module
  (func (export "_water_v0"))
  (func (export "_water_init") (result i32) (i32.const 0))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const -63))
  (func (export "_water_dial") (param $caller i32) (result i32)
    (local.get $caller))
  (func (export "_water_worker") (result i32) (i32.const 0))
)
"#;

/// `_water_dial` answers with a descriptor the bridge never issued.
pub const BOGUS_FD_GUEST: &str = r#"(module
  (func (export "_water_v0"))
  (func (export "_water_init") (result i32) (i32.const 0))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
  (func (export "_water_dial") (param $caller i32) (result i32) (i32.const 999))
  (func (export "_water_worker") (result i32) (i32.const 0))
)
"#;

/// Missing `_water_worker` entirely.
pub const NO_WORKER_GUEST: &str = r#"(module
  (func (export "_water_v0"))
  (func (export "_water_init") (result i32) (i32.const 0))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
)
"#;

/// Only advertises a version this host has never heard of.
pub const FUTURE_VERSION_GUEST: &str = r#"(module
  (func (export "_water_v9"))
  (func (export "_water_init") (result i32) (i32.const 0))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
  (func (export "_water_worker") (result i32) (i32.const 0))
)
"#;

/// Calls `host_defer` from `_water_init`, then reports success.
pub const DEFERRING_GUEST: &str = r#"(module
  (import "env" "host_defer" (func $host_defer))
  (func (export "_water_v0"))
  (func (export "_water_init") (result i32)
    (call $host_defer)
    (i32.const 0))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
  (func (export "_water_worker") (result i32) (i32.const 0))
)
"#;

/// Probes `host_dial` even though no dialer is bound; init succeeds only if
/// the stub answers `-EPERM`.
pub const PERM_PROBING_GUEST: &str = r#"(module
  (import "env" "host_dial" (func $host_dial (result i32)))
  (func (export "_water_v0"))
  (func (export "_water_init") (result i32)
    (if (i32.eq (call $host_dial) (i32.const -63))
      (then (return (i32.const 0))))
    (i32.const -28))
  (func (export "_water_cancel_with") (param $fd i32) (result i32) (i32.const 0))
  (func (export "_water_worker") (result i32) (i32.const 0))
)
"#;
