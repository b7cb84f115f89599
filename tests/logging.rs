//! Log output of server lifecycle events and session panics.

use std::time::Duration;

use rstest::rstest;
use serial_test::serial;
use sessionframe::{FramingConfig, SessionServer};
use sessionframe_testing::{
    LoggerHandle,
    RecordingHandler,
    Reply,
    TestResult,
    logger,
    unused_listener,
    unused_socket,
    wait_for,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

const LIMIT: Duration = Duration::from_secs(2);

#[rstest]
#[tokio::test]
#[serial]
async fn shutdown_logs_each_listener(mut logger: LoggerHandle) -> TestResult {
    let running = SessionServer::new()
        .packet_handler(RecordingHandler::new(Reply::Echo))
        .bind_existing_listener(unused_listener()?)?
        .bind_existing_socket(unused_socket()?)?
        .start()?;
    let tcp = running.local_addr().ok_or("missing tcp addr")?.port();
    let udp = running.udp_local_addr().ok_or("missing udp addr")?.port();
    running.shutdown().await;

    let mut lines = Vec::new();
    while let Some(record) = logger.pop() {
        lines.push(record.args().to_string());
    }
    assert!(lines.contains(&format!("shutdown TCP server on port {tcp}")), "{lines:?}");
    assert!(lines.contains(&format!("shutdown UDP server on port {udp}")), "{lines:?}");
    Ok(())
}

#[rstest]
#[tokio::test]
#[serial]
async fn handler_panic_still_finishes_the_session(mut logger: LoggerHandle) -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo)
        .newline()
        .panic_on(b"boom")
        .farewell(b"bye\n");
    let running = SessionServer::with_framing(FramingConfig::text().linger(Duration::ZERO))
        .packet_handler_factory({
            let handler = handler.clone();
            move || handler.clone()
        })
        .bind_existing_listener(unused_listener()?)?
        .start()?;
    let addr = running.local_addr().ok_or("server missing local addr")?;

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"boom\n").await?;
    let mut rest = Vec::new();
    timeout(LIMIT, stream.read_to_end(&mut rest)).await??;
    assert_eq!(rest, b"bye\n");
    assert!(wait_for(|| running.idle_worker_count() == 1, LIMIT).await);
    assert!(logger.drain_contains("session task panicked"));
    {
        let journal = handler.journal();
        assert_eq!(journal.final_packets, vec![true]);
        assert_eq!(journal.info_cleared, 1);
        assert_eq!(journal.terminated.len(), 1);
        assert_eq!(
            journal.terminated[0].error.as_deref(),
            Some("packet handler failed: handler panicked: handler asked to panic")
        );
    }

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"fine\n").await?;
    let mut buf = [0_u8; 5];
    timeout(LIMIT, stream.read_exact(&mut buf)).await??;
    assert_eq!(&buf, b"fine\n");
    assert_eq!(running.worker_count(), 1);

    drop(stream);
    running.shutdown().await;
    assert_eq!(handler.terminations().len(), 2);
    assert_eq!(handler.journal().info_cleared, 2);
    Ok(())
}
