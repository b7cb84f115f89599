//! End-to-end TCP sessions against a running [`SessionServer`].

use std::time::Duration;

use rstest::rstest;
use sessionframe::{FramingConfig, RunningServer, SessionServer, TimeoutPolicy};
use sessionframe_testing::{RecordingHandler, Reply, TestResult, unused_listener, wait_for};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::timeout,
};

const LIMIT: Duration = Duration::from_secs(2);

fn start(handler: &RecordingHandler, framing: FramingConfig) -> TestResult<RunningServer> {
    let handler = handler.clone();
    let running = SessionServer::with_framing(framing.linger(Duration::ZERO))
        .packet_handler_factory(move || handler.clone())
        .bind_existing_listener(unused_listener()?)?
        .start()?;
    Ok(running)
}

async fn connect(running: &RunningServer) -> TestResult<TcpStream> {
    let addr = running.local_addr().ok_or("server missing local addr")?;
    Ok(TcpStream::connect(addr).await?)
}

async fn read_exactly(stream: &mut TcpStream, len: usize) -> TestResult<String> {
    let mut buf = vec![0_u8; len];
    timeout(LIMIT, stream.read_exact(&mut buf)).await??;
    Ok(String::from_utf8(buf)?)
}

async fn read_to_close(stream: &mut TcpStream) -> TestResult<String> {
    let mut buf = Vec::new();
    timeout(LIMIT, stream.read_to_end(&mut buf)).await??;
    Ok(String::from_utf8(buf)?)
}

#[tokio::test]
async fn replies_with_reversed_line() -> TestResult {
    let handler = RecordingHandler::new(Reply::Reverse).newline();
    let running = start(&handler, FramingConfig::text())?;
    let stream = connect(&running).await?;
    let mut reader = BufReader::new(stream);

    reader.get_mut().write_all(b"HELLO\r\n").await?;
    let mut line = String::new();
    timeout(LIMIT, reader.read_line(&mut line)).await??;
    assert_eq!(line, "OLLEH\n");

    drop(reader);
    assert!(wait_for(|| handler.terminations().len() == 1, LIMIT).await);
    let terminations = handler.terminations();
    assert_eq!(terminations[0].read, 7);
    assert_eq!(terminations[0].written, 6);
    assert_eq!(handler.journal().started.len(), 1);
    assert_eq!(handler.journal().info_cleared, 1);
    running.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn greets_tcp_peers_before_reading() -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo).greeting(b"welcome\n");
    let running = start(&handler, FramingConfig::text())?;
    let mut stream = connect(&running).await?;
    assert_eq!(read_exactly(&mut stream, 8).await?, "welcome\n");
    running.shutdown().await;
    Ok(())
}

#[rstest]
#[case::fixed(FramingConfig::text().prompt("> "), "> ", "> ")]
#[case::numbered(FramingConfig::text().auto_prompt(true), "1> ", "2> ")]
#[tokio::test]
async fn prompts_before_each_packet(
    #[case] framing: FramingConfig,
    #[case] first: &str,
    #[case] second: &str,
) -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo).newline();
    let running = start(&handler, framing)?;
    let mut stream = connect(&running).await?;

    assert_eq!(read_exactly(&mut stream, first.len()).await?, first);
    stream.write_all(b"abc\n").await?;
    let expected = format!("abc\n{second}");
    assert_eq!(read_exactly(&mut stream, expected.len()).await?, expected);
    running.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn handler_ends_session_with_final_packet() -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo)
        .newline()
        .quit_on(b"quit")
        .farewell(b"bye\n");
    let running = start(&handler, FramingConfig::text())?;
    let mut stream = connect(&running).await?;

    stream.write_all(b"quit\n").await?;
    assert_eq!(read_to_close(&mut stream).await?, "quit\nbye\n");
    assert!(wait_for(|| handler.terminations().len() == 1, LIMIT).await);
    assert_eq!(handler.terminations()[0].error, None);
    assert_eq!(handler.journal().final_packets, vec![false]);
    running.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn handler_error_ends_session() -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo).fail_on(b"bad");
    let running = start(&handler, FramingConfig::text())?;
    let mut stream = connect(&running).await?;

    stream.write_all(b"bad\nignored\n").await?;
    assert_eq!(read_to_close(&mut stream).await?, "");
    assert!(wait_for(|| handler.terminations().len() == 1, LIMIT).await);
    let error = handler.terminations()[0].error.clone().unwrap_or_default();
    assert!(error.starts_with("packet handler failed"), "{error}");
    assert_eq!(handler.journal().final_packets, vec![true]);
    assert_eq!(handler.journal().packets.len(), 1);
    running.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn peer_close_mid_line_reports_end_of_stream() -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo);
    let running = start(&handler, FramingConfig::text())?;
    let mut stream = connect(&running).await?;

    stream.write_all(b"abc").await?;
    stream.shutdown().await?;
    assert!(wait_for(|| handler.terminations().len() == 1, LIMIT).await);
    assert_eq!(
        handler.terminations()[0].error.as_deref(),
        Some("end of stream [@ 3]")
    );
    assert!(handler.journal().packets.is_empty());
    running.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn idle_timeout_closes_silent_peer() -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo);
    let framing = FramingConfig::text()
        .timeouts(TimeoutPolicy::none().idle(Duration::from_millis(100)));
    let running = start(&handler, framing)?;
    let mut stream = connect(&running).await?;

    assert_eq!(read_to_close(&mut stream).await?, "");
    assert!(wait_for(|| handler.terminations().len() == 1, LIMIT).await);
    let error = handler.terminations()[0].error.clone().unwrap_or_default();
    assert!(error.starts_with("read timeout"), "{error}");
    running.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn session_timeout_limits_chatty_peer() -> TestResult {
    let handler = RecordingHandler::new(Reply::Silent);
    let framing = FramingConfig::text()
        .timeouts(TimeoutPolicy::none().session(Duration::from_millis(200)));
    let running = start(&handler, framing)?;
    let mut stream = connect(&running).await?;

    for _ in 0..10 {
        if stream.write_all(b"x\n").await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(wait_for(|| handler.terminations().len() == 1, LIMIT).await);
    let error = handler.terminations()[0].error.clone().unwrap_or_default();
    assert!(error.starts_with("session timeout"), "{error}");
    running.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_terminates_every_blocked_session() -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo).newline();
    let running = start(&handler, FramingConfig::text())?;

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut stream = connect(&running).await?;
        stream.write_all(b"hi\n").await?;
        assert_eq!(read_exactly(&mut stream, 3).await?, "hi\n");
        clients.push(stream);
    }
    assert_eq!(running.worker_count(), 3);

    timeout(LIMIT, running.shutdown()).await?;
    assert!(running.is_shutdown());
    let terminations = handler.terminations();
    assert_eq!(terminations.len(), 3);
    assert!(terminations.iter().all(|t| t.error.is_some()));

    for mut client in clients {
        assert_eq!(read_to_close(&mut client).await?, "");
    }
    Ok(())
}

#[tokio::test]
async fn shared_handler_serves_every_session() -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo).newline();
    let running = SessionServer::new()
        .framing(FramingConfig::text().linger(Duration::ZERO))
        .packet_handler(handler.clone())
        .bind_existing_listener(unused_listener()?)?
        .start()?;

    for word in ["one", "two"] {
        let mut stream = connect(&running).await?;
        stream.write_all(format!("{word}\n").as_bytes()).await?;
        assert_eq!(read_exactly(&mut stream, word.len() + 1).await?, format!("{word}\n"));
    }
    running.shutdown().await;
    assert_eq!(handler.journal().packets.len(), 2);
    assert_eq!(handler.terminations().len(), 2);
    Ok(())
}

#[tokio::test]
async fn shared_handler_recovers_after_panic() -> TestResult {
    let handler = RecordingHandler::new(Reply::Echo).newline().panic_on(b"boom");
    let running = SessionServer::new()
        .framing(FramingConfig::text().linger(Duration::ZERO))
        .packet_handler(handler.clone())
        .bind_existing_listener(unused_listener()?)?
        .start()?;

    let mut stream = connect(&running).await?;
    stream.write_all(b"boom\n").await?;
    assert_eq!(read_to_close(&mut stream).await?, "");
    assert!(wait_for(|| handler.terminations().len() == 1, LIMIT).await);
    let error = handler.terminations()[0].error.clone().unwrap_or_default();
    assert!(error.contains("handler panicked"), "{error}");

    let mut stream = connect(&running).await?;
    stream.write_all(b"again\n").await?;
    assert_eq!(read_exactly(&mut stream, 6).await?, "again\n");
    running.shutdown().await;
    assert_eq!(handler.terminations().len(), 2);
    assert_eq!(handler.journal().info_cleared, 2);
    Ok(())
}
