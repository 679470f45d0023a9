//! JSON-lines control channel

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::event::ServiceEvent;

/// Forward every event read from `reader` to the event loop.
///
/// Blank lines are skipped, malformed lines are logged and skipped. Returns
/// the number of events forwarded once the input ends or the event loop is
/// gone.
pub async fn forward_control_lines<R>(reader: R, events: UnboundedSender<ServiceEvent>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Control channel closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Control channel read failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let event = match ServiceEvent::from_json_line(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, %line, "Ignoring malformed control line");
                continue;
            }
        };

        if events.send(event).is_err() {
            info!("Event loop stopped, closing control channel");
            break;
        }
        forwarded = forwarded.saturating_add(1);
    }

    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_forwards_valid_lines_and_skips_garbage() {
        let input: &[u8] = b"{\"type\":\"delete_all\"}\n\nnot json\n{\"type\":\"delete\",\"id\":\"2a1022fe\"}\n";
        let (tx, mut rx) = mpsc::unbounded_channel();

        let forwarded = forward_control_lines(BufReader::new(input), tx).await;

        assert_eq!(forwarded, 2);
        assert_eq!(rx.recv().await, Some(ServiceEvent::DeleteAll));
        assert_eq!(
            rx.recv().await,
            Some(ServiceEvent::Delete {
                id: "2a1022fe".to_string()
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_stops_when_event_loop_is_gone() {
        let input: &[u8] = b"{\"type\":\"delete_all\"}\n{\"type\":\"factory_reset\"}\n";
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        assert_eq!(forward_control_lines(BufReader::new(input), tx).await, 0);
    }
}
