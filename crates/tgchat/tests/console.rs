//! Console loop driven through an in-memory pipe.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tgchat::notify::local::LocalExchange;
use tgchat::{ChatConfig, ChatError, ParticipantId, Session, console};
use tokio::io::{AsyncWriteExt, BufReader};

static NEXT_NAMESPACE: AtomicU32 = AtomicU32::new(0);

fn config() -> ChatConfig {
    ChatConfig::new(format!(
        "tgconsoletest{}x{}",
        std::process::id(),
        NEXT_NAMESPACE.fetch_add(1, Ordering::Relaxed)
    ))
    .unwrap()
}

fn id(raw: i32) -> ParticipantId {
    ParticipantId::new(raw).unwrap()
}

/// Output sink the test can inspect while the console is writing to it.
#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    async fn wait_for(&self, needle: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.text().contains(needle) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{needle:?} never showed up in {:?}", self.text()));
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn two_participants_exchange_a_message() {
    let exchange = LocalExchange::new();
    let config = config();

    let (a_notifier, mut a_inbox) = exchange.connect(id(1000));
    let a = Session::create(&config, id(1000), a_notifier).unwrap();
    let (mut keyboard, stdin) = tokio::io::duplex(1024);
    let output = SharedOutput::default();
    let mut a_out = output.clone();

    let console = console::run(&a, &mut a_inbox, BufReader::new(stdin), &mut a_out);
    let driver = async {
        // The console answers the join request by itself.
        let (b_notifier, mut b_inbox) = exchange.connect(id(2000));
        let b = Session::join(&config, id(2000), id(1000), b_notifier, &mut b_inbox)
            .await
            .unwrap();
        b.tell(id(1000), "hi").unwrap();
        output.wait_for("2000: hi\n").await;

        keyboard.write_all(b"/exit\n").await.unwrap();
        b
    };
    let (result, b) = tokio::join!(console, driver);
    result.unwrap();
    assert!(output.text().starts_with("> "));
    assert!(output.text().contains("\r2000: hi\n"));

    let departure = a.leave().unwrap();
    assert!(!departure.unlinked);
    assert_eq!(b.participants().unwrap(), vec![id(2000)]);
    assert!(b.leave().unwrap().unlinked);
}

#[tokio::test]
async fn commands_write_their_output() {
    let exchange = LocalExchange::new();
    let config = config();
    let (notifier, mut inbox) = exchange.connect(id(1000));
    let a = Session::create(&config, id(1000), notifier).unwrap();

    let input: &[u8] = b"/me\n/help\n/dance\n/tell 1000\n/tell 5000 hi\n/exit\n";
    let mut out = Vec::new();
    console::run(&a, &mut inbox, input, &mut out).await.unwrap();

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("PID: 1000\n"), "{out}");
    assert!(out.contains("/tell <pid> <msg>"), "{out}");
    assert!(out.contains("error: "), "{out}");
    assert!(out.contains("5000"), "{out}");
    a.leave().unwrap();
}

#[tokio::test]
async fn oversized_message_is_reported_and_the_loop_continues() {
    let exchange = LocalExchange::new();
    let config = config();
    let (notifier, mut inbox) = exchange.connect(id(1000));
    let a = Session::create(&config, id(1000), notifier).unwrap();

    let input = format!("/say {}\n/me\n/exit\n", "x".repeat(300));
    let mut out = Vec::new();
    console::run(&a, &mut inbox, input.as_bytes(), &mut out)
        .await
        .unwrap();

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("error: "), "{out}");
    assert!(out.contains("PID: 1000\n"), "{out}");
    a.leave().unwrap();
}

#[tokio::test]
async fn end_of_input_is_an_input_error() {
    let exchange = LocalExchange::new();
    let config = config();
    let (notifier, mut inbox) = exchange.connect(id(1000));
    let a = Session::create(&config, id(1000), notifier).unwrap();

    let mut out = Vec::new();
    let err = console::run(&a, &mut inbox, &b"/me\n"[..], &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Input));
    assert_eq!(err.exit_code(), 4);
    assert!(a.leave().unwrap().unlinked);
}

#[tokio::test]
async fn invalid_utf8_lines_are_processed() {
    let exchange = LocalExchange::new();
    let config = config();
    let (a_notifier, mut a_inbox) = exchange.connect(id(1000));
    let a = Session::create(&config, id(1000), a_notifier).unwrap();

    let (b_notifier, mut b_inbox) = exchange.connect(id(2000));
    let joining = Session::join(&config, id(2000), id(1000), b_notifier, &mut b_inbox);
    let answering = async {
        let envelope = a_inbox.recv().await.unwrap();
        assert!(a.handle(envelope).unwrap().is_none());
    };
    let (b, ()) = tokio::join!(joining, answering);
    let b = b.unwrap();

    let input: &[u8] = b"/say caf\xe9\n/tell 2000 caf\xe9\n/me\n/exit\n";
    let mut out = Vec::new();
    console::run(&a, &mut a_inbox, input, &mut out).await.unwrap();

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("PID: 1000\n"), "{out}");
    assert!(!out.contains("error: "), "{out}");

    for _ in 0..2 {
        let envelope = b_inbox.try_recv().unwrap();
        let message = b.handle(envelope).unwrap().unwrap();
        assert_eq!(message.render(), "1000: caf\u{FFFD}");
    }

    a.leave().unwrap();
    assert!(b.leave().unwrap().unlinked);
}

#[tokio::test]
async fn last_line_without_newline_is_processed() {
    let exchange = LocalExchange::new();
    let config = config();
    let (notifier, mut inbox) = exchange.connect(id(1000));
    let a = Session::create(&config, id(1000), notifier).unwrap();

    let mut out = Vec::new();
    console::run(&a, &mut inbox, &b"/me\n/exit"[..], &mut out)
        .await
        .unwrap();
    assert!(String::from_utf8(out).unwrap().contains("PID: 1000\n"));
    a.leave().unwrap();
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_output_is_not_end_of_input() {
    let exchange = LocalExchange::new();
    let config = config();
    let (notifier, mut inbox) = exchange.connect(id(1000));
    let a = Session::create(&config, id(1000), notifier).unwrap();

    let err = console::run(&a, &mut inbox, &b"/me\n/exit\n"[..], &mut BrokenPipe)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Output(_)), "{err}");
    assert_ne!(err.exit_code(), ChatError::Input.exit_code());
    a.leave().unwrap();
}
