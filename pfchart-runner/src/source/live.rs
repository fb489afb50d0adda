//! Live price feed over in-process channels.
//!
//! A feed adapter holds a [`LivePublisher`] per symbol and pushes points as
//! they arrive; the run opens the matching stream and blocks on it, waking
//! every `poll_interval` to check for cancellation. `finish()` ends a
//! symbol's stream cleanly so its chart is saved like an end-of-day run.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use pfchart_core::PricePoint;
use tracing::debug;

use super::{PriceSource, PriceStream, SourceError};
use crate::cancel::CancelToken;

enum Message {
    Point(PricePoint),
    End,
}

/// Sending half for one symbol.
#[derive(Clone)]
pub struct LivePublisher {
    symbol: String,
    tx: Sender<Message>,
}

impl LivePublisher {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Push a point. Returns false once the stream has been dropped.
    pub fn publish(&self, point: PricePoint) -> bool {
        self.tx.send(Message::Point(point)).is_ok()
    }

    /// End the stream; the consumer sees it as exhausted.
    pub fn finish(self) {
        let _ = self.tx.send(Message::End);
    }
}

pub struct LiveSource {
    poll_interval: Duration,
    /// `None` once the symbol's stream has been opened.
    feeds: Mutex<HashMap<String, Option<Receiver<Message>>>>,
}

impl LiveSource {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    /// Register `symbol` and return its publisher. Registering again
    /// replaces a stream nobody has opened yet.
    pub fn publisher(&self, symbol: &str) -> LivePublisher {
        let symbol = symbol.trim().to_ascii_uppercase();
        let (tx, rx) = mpsc::channel();
        self.feeds().insert(symbol.clone(), Some(rx));
        LivePublisher { symbol, tx }
    }

    fn feeds(&self) -> MutexGuard<'_, HashMap<String, Option<Receiver<Message>>>> {
        // a panicked holder only ever left a complete map behind
        self.feeds.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PriceSource for LiveSource {
    fn name(&self) -> &str {
        "live"
    }

    fn known_symbols(&self) -> Result<Vec<String>, SourceError> {
        let mut symbols: Vec<String> = self.feeds().keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    /// Each registered symbol can be opened once.
    fn open(
        &self,
        symbol: &str,
        begin: Option<NaiveDate>,
    ) -> Result<Box<dyn PriceStream>, SourceError> {
        let key = symbol.trim().to_ascii_uppercase();
        let rx = match self.feeds().get_mut(&key) {
            Some(slot) => slot.take().ok_or_else(|| SourceError::AlreadyOpen {
                symbol: key.clone(),
            })?,
            None => return Err(SourceError::SymbolNotFound { symbol: key }),
        };
        Ok(Box::new(LiveStream {
            symbol: key,
            rx,
            begin,
            poll_interval: self.poll_interval,
        }))
    }
}

struct LiveStream {
    symbol: String,
    rx: Receiver<Message>,
    begin: Option<NaiveDate>,
    poll_interval: Duration,
}

impl PriceStream for LiveStream {
    fn next_point(&mut self, cancel: &CancelToken) -> Result<Option<PricePoint>, SourceError> {
        loop {
            if cancel.is_cancelled() {
                debug!(symbol = %self.symbol, "live stream cancelled");
                return Ok(None);
            }
            match self.rx.recv_timeout(self.poll_interval) {
                Ok(Message::Point(point)) => {
                    if self.begin.is_some_and(|day| point.timestamp.date_naive() < day) {
                        continue;
                    }
                    return Ok(Some(point));
                }
                Ok(Message::End) => return Ok(None),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SourceError::Disconnected {
                        symbol: self.symbol.clone(),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::thread;

    fn point(day: u32) -> PricePoint {
        PricePoint::new(Utc.with_ymd_and_hms(2024, 3, day, 15, 0, 0).unwrap(), dec!(50))
    }

    #[test]
    fn publishes_then_finishes() {
        let source = LiveSource::new(Duration::from_millis(5));
        let publisher = source.publisher("spy");
        assert_eq!(source.known_symbols().unwrap(), vec!["SPY"]);
        let mut stream = source.open("SPY", NaiveDate::from_ymd_opt(2024, 3, 2)).unwrap();

        let feed = thread::spawn(move || {
            for day in 1..=3 {
                publisher.publish(point(day));
            }
            publisher.finish();
        });

        let cancel = CancelToken::new();
        let mut days = Vec::new();
        while let Some(p) = stream.next_point(&cancel).unwrap() {
            days.push(p.timestamp.date_naive());
        }
        feed.join().unwrap();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()
            ]
        );
    }

    #[test]
    fn cancel_wakes_an_idle_stream() {
        let source = LiveSource::new(Duration::from_millis(5));
        let _publisher = source.publisher("QQQ");
        let mut stream = source.open("qqq", None).unwrap();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });
        assert!(stream.next_point(&cancel).unwrap().is_none());
        stopper.join().unwrap();
    }

    #[test]
    fn dropped_publisher_is_a_disconnect() {
        let source = LiveSource::new(Duration::from_millis(5));
        drop(source.publisher("IWM"));
        let mut stream = source.open("IWM", None).unwrap();
        let err = stream.next_point(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, SourceError::Disconnected { .. }));
    }

    #[test]
    fn streams_open_once() {
        let source = LiveSource::new(Duration::from_millis(5));
        let _publisher = source.publisher("T");
        assert!(source.open("T", None).is_ok());
        assert!(matches!(
            source.open("T", None),
            Err(SourceError::AlreadyOpen { .. })
        ));
        assert!(matches!(
            source.open("VTI", None),
            Err(SourceError::SymbolNotFound { .. })
        ));
    }
}
