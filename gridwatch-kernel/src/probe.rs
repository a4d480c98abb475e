use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Tente uniquement l'établissement TCP vers host:port.
/// Refus, timeout, DNS introuvable... tout échec vaut `false`.
pub async fn probe(host: &str, port: u16, limit: Duration) -> bool {
    // le timeout couvre aussi la résolution DNS
    match connect_within(TcpStream::connect((host, port)), limit).await {
        Ok(_stream) => true,
        Err(e) if e.kind() == io::ErrorKind::TimedOut => {
            debug!(host, port, ?limit, "probe timed out");
            false
        }
        Err(e) => {
            debug!(host, port, error = %e, "probe failed");
            false
        }
    }
}

/// Borne une tentative de connexion ; l'expiration devient `TimedOut`.
pub(crate) async fn connect_within<F, T>(connect: F, limit: Duration) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    timeout(limit, connect).await.unwrap_or_else(|_| {
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no connection after {limit:?}"),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    const LIMIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe("127.0.0.1", port, LIMIT).await);
    }

    #[tokio::test]
    async fn test_refused_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!probe("127.0.0.1", port, LIMIT).await);
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        assert!(!probe("no-such-host.invalid", 27015, LIMIT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_connect_is_cut_at_limit() {
        let started = Instant::now();
        let err = connect_within(std::future::pending::<io::Result<()>>(), LIMIT)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= LIMIT && elapsed < LIMIT * 2, "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_fast_connect_is_untouched() {
        let value = connect_within(async { Ok::<_, io::Error>(7) }, LIMIT).await.unwrap();
        assert_eq!(value, 7);
    }
}
