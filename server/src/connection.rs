//! Per-connection request/response loop.
//!
//! One command is read, executed, and answered at a time; responses on
//! a connection are therefore ordered exactly as its requests. A
//! protocol error keeps the connection open - only `quit`, end of
//! stream, and I/O failures end the session.

use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use kiln_cache::{CacheError, LruCache};
use kiln_protocol::Command;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::metrics::{
    DECRS, DELETES, GETS, HITS, INCRS, MISSES, PROTOCOL_ERRORS, SETS, STORE_ERRORS,
};
use crate::reader::LineReader;

/// Serve one established connection until the session ends.
pub async fn serve_connection(stream: TcpStream, cache: Arc<LruCache>) -> io::Result<()> {
    let (read_half, write_half) = stream.into_split();
    run_session(read_half, write_half, cache).await
}

/// Protocol loop over any byte stream. Split from the TCP entry point
/// so tests can drive it over in-memory pipes.
pub(crate) async fn run_session<R, W>(read: R, write: W, cache: Arc<LruCache>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = LineReader::new(read);
    let mut writer = BufWriter::new(write);

    loop {
        let Some(line) = reader.read_line().await? else {
            return Ok(());
        };

        match kiln_protocol::parse(&line) {
            Err(e) => {
                PROTOCOL_ERRORS.increment();
                write_client_error(&mut writer, &e.to_string()).await?;
            }
            Ok(Command::Quit) => return Ok(()),
            Ok(Command::Get { keys }) => handle_get(&mut writer, &cache, &keys, false).await?,
            Ok(Command::Gets { keys }) => handle_get(&mut writer, &cache, &keys, true).await?,
            Ok(Command::Set {
                key, flags, bytes, ..
            }) => handle_set(&mut reader, &mut writer, &cache, &key, flags, bytes).await?,
            Ok(Command::Delete { key }) => handle_delete(&mut writer, &cache, &key).await?,
            Ok(Command::Incr { key, delta }) => {
                INCRS.increment();
                handle_counter(&mut writer, cache.incr(&key, delta)).await?;
            }
            Ok(Command::Decr { key, delta }) => {
                DECRS.increment();
                handle_counter(&mut writer, cache.decr(&key, delta)).await?;
            }
        }
        writer.flush().await?;
    }
}

async fn handle_get<W>(
    writer: &mut W,
    cache: &LruCache,
    keys: &[Vec<u8>],
    with_cas: bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut header = BytesMut::with_capacity(64);
    let mut digits = itoa::Buffer::new();

    for key in keys {
        GETS.increment();
        let Some(item) = cache.get(key) else {
            MISSES.increment();
            continue;
        };
        HITS.increment();

        header.clear();
        header.extend_from_slice(b"VALUE ");
        header.extend_from_slice(key);
        header.extend_from_slice(b" ");
        header.extend_from_slice(digits.format(item.flags).as_bytes());
        header.extend_from_slice(b" ");
        header.extend_from_slice(digits.format(item.value.len()).as_bytes());
        if with_cas {
            header.extend_from_slice(b" ");
            header.extend_from_slice(digits.format(item.cas).as_bytes());
        }
        header.extend_from_slice(b"\r\n");

        writer.write_all(&header).await?;
        writer.write_all(&item.value).await?;
        writer.write_all(b"\r\n").await?;
    }
    writer.write_all(b"END\r\n").await
}

async fn handle_set<R, W>(
    reader: &mut LineReader<R>,
    writer: &mut W,
    cache: &LruCache,
    key: &[u8],
    flags: u32,
    bytes: usize,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    SETS.increment();

    let Some(value) = reader.read_payload(bytes).await? else {
        PROTOCOL_ERRORS.increment();
        return write_client_error(writer, "bad data chunk").await;
    };
    if !reader.consume_terminator().await? {
        PROTOCOL_ERRORS.increment();
        return write_client_error(writer, "bad data chunk").await;
    }

    match cache.set(key, flags, &value) {
        Ok(()) => writer.write_all(b"STORED\r\n").await,
        Err(e @ (CacheError::TooLarge | CacheError::NoSpace)) => {
            STORE_ERRORS.increment();
            write_server_error(writer, &e.to_string()).await
        }
        Err(_) => {
            STORE_ERRORS.increment();
            write_server_error(writer, "internal error").await
        }
    }
}

async fn handle_delete<W>(writer: &mut W, cache: &LruCache, key: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    DELETES.increment();
    if cache.delete(key) {
        writer.write_all(b"DELETED\r\n").await
    } else {
        writer.write_all(b"NOT_FOUND\r\n").await
    }
}

async fn handle_counter<W>(writer: &mut W, result: Result<u64, CacheError>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match result {
        Ok(value) => {
            let mut digits = itoa::Buffer::new();
            writer.write_all(digits.format(value).as_bytes()).await?;
            writer.write_all(b"\r\n").await
        }
        Err(e @ (CacheError::NonNumeric | CacheError::Overflow)) => {
            PROTOCOL_ERRORS.increment();
            write_client_error(writer, &e.to_string()).await
        }
        Err(e @ (CacheError::TooLarge | CacheError::NoSpace)) => {
            STORE_ERRORS.increment();
            write_server_error(writer, &e.to_string()).await
        }
    }
}

async fn write_client_error<W>(writer: &mut W, msg: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"CLIENT_ERROR ").await?;
    writer.write_all(msg.as_bytes()).await?;
    writer.write_all(b"\r\n").await
}

async fn write_server_error<W>(writer: &mut W, msg: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"SERVER_ERROR ").await?;
    writer.write_all(msg.as_bytes()).await?;
    writer.write_all(b"\r\n").await
}
