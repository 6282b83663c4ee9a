//! The connection pump.
//!
//! One spawned task owns the writer, the request-ID counter, and the map of
//! pending responses; callers talk to it through an unbounded queue. A
//! second task owns the reader so that cancelling the pump's `select` can
//! never abandon a half-read frame.

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::message::Message;
use crate::method;
use crate::types::{AnyNotification, AnyRequest, AnyResponse, RequestId};
use crate::{Error, Result};

enum Outbound {
	Request {
		method: String,
		params: JsonValue,
		response_tx: oneshot::Sender<Result<AnyResponse>>,
	},
	Notification(AnyNotification),
}

/// Handle to one peer.
///
/// Cheap to clone; every clone feeds the same I/O task. The task exits when
/// the peer closes the channel, a write fails, or all handles are dropped,
/// and every request still pending at that point resolves with
/// [`Error::ConnectionStopped`].
#[derive(Clone)]
pub struct Connection {
	outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
	/// Spawn the I/O tasks over a raw byte channel.
	///
	/// Peer notifications are forwarded to `notification_tx` in arrival
	/// order. Dropping the receiving half silently discards them; it does
	/// not stop the connection.
	pub fn spawn(
		reader: impl AsyncRead + Send + Unpin + 'static,
		writer: impl AsyncWrite + Send + Unpin + 'static,
		notification_tx: mpsc::UnboundedSender<AnyNotification>,
	) -> Self {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		tokio::spawn(run_reader(BufReader::new(reader), inbound_tx));
		tokio::spawn(run_pump(writer, outbound_rx, inbound_rx, notification_tx));
		Self { outbound_tx }
	}

	/// Send a typed request and await its decoded result.
	pub async fn request<R: method::Request>(&self, params: R::Params) -> Result<R::Result> {
		let result = self.request_raw(R::METHOD, serde_json::to_value(params)?).await?;
		Ok(serde_json::from_value(result)?)
	}

	/// Send an untyped request and await the raw result payload.
	pub async fn request_raw(&self, method: &str, params: JsonValue) -> Result<JsonValue> {
		let (response_tx, response_rx) = oneshot::channel();
		self.send(Outbound::Request { method: method.to_owned(), params, response_tx })?;
		let resp = response_rx.await.map_err(|_| Error::ConnectionStopped)??;
		match resp.error {
			None => Ok(resp.result.unwrap_or_default()),
			Some(error) => Err(Error::Response(error)),
		}
	}

	/// Send a typed request and drop the response when it arrives.
	///
	/// The request is still written in queue order relative to other calls
	/// on this connection.
	pub fn request_forget<R: method::Request>(&self, params: R::Params) -> Result<()> {
		let (response_tx, _discard) = oneshot::channel();
		self.send(Outbound::Request {
			method: R::METHOD.to_owned(),
			params: serde_json::to_value(params)?,
			response_tx,
		})
	}

	/// Send a typed notification.
	pub fn notify<N: method::Notification>(&self, params: N::Params) -> Result<()> {
		self.send(Outbound::Notification(AnyNotification {
			method: N::METHOD.to_owned(),
			params: serde_json::to_value(params)?,
		}))
	}

	/// True once the I/O task has exited.
	pub fn is_closed(&self) -> bool {
		self.outbound_tx.is_closed()
	}

	fn send(&self, outbound: Outbound) -> Result<()> {
		self.outbound_tx.send(outbound).map_err(|_| Error::ConnectionStopped)
	}
}

async fn run_reader(
	mut reader: BufReader<impl AsyncRead + Unpin>,
	inbound_tx: mpsc::UnboundedSender<Message>,
) {
	loop {
		match Message::read(&mut reader).await {
			Ok(Some(message)) => {
				if inbound_tx.send(message).is_err() {
					break;
				}
			}
			Ok(None) => {
				debug!("peer closed the channel");
				break;
			}
			Err(err) => {
				warn!(error = %err, "inbound read failed");
				break;
			}
		}
	}
}

async fn run_pump(
	mut writer: impl AsyncWrite + Unpin,
	mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
	mut inbound_rx: mpsc::UnboundedReceiver<Message>,
	notification_tx: mpsc::UnboundedSender<AnyNotification>,
) {
	let mut next_id = 0_i64;
	let mut pending: HashMap<RequestId, oneshot::Sender<Result<AnyResponse>>> = HashMap::new();

	loop {
		tokio::select! {
			outbound = outbound_rx.recv() => match outbound {
				Some(Outbound::Request { method, params, response_tx }) => {
					let id = RequestId::Number(next_id);
					next_id += 1;
					let message = Message::Request(AnyRequest { id: id.clone(), method, params });
					match message.write(&mut writer).await {
						Ok(()) => {
							pending.insert(id, response_tx);
						}
						Err(err) => {
							warn!(error = %err, "request write failed; stopping connection");
							let _ = response_tx.send(Err(err));
							break;
						}
					}
				}
				Some(Outbound::Notification(notif)) => {
					if let Err(err) = Message::Notification(notif).write(&mut writer).await {
						warn!(error = %err, "notification write failed; stopping connection");
						break;
					}
				}
				// All handles dropped.
				None => break,
			},
			inbound = inbound_rx.recv() => match inbound {
				Some(Message::Response(resp)) => match pending.remove(&resp.id) {
					Some(response_tx) => {
						let _ = response_tx.send(Ok(resp));
					}
					None => debug!(id = %resp.id, "response for unknown request"),
				},
				Some(Message::Notification(notif)) => {
					// Nobody listening is not an error.
					let _ = notification_tx.send(notif);
				}
				Some(Message::Request(req)) => {
					debug!(id = %req.id, method = %req.method, "ignoring peer request");
				}
				// Reader hit EOF or a fatal decode error.
				None => break,
			},
		}
	}

	// Resolve everything still waiting so callers see a deterministic
	// error instead of hanging on a dead channel.
	for (_, response_tx) in pending.drain() {
		let _ = response_tx.send(Err(Error::ConnectionStopped));
	}
	outbound_rx.close();
	while let Ok(outbound) = outbound_rx.try_recv() {
		if let Outbound::Request { response_tx, .. } = outbound {
			let _ = response_tx.send(Err(Error::ConnectionStopped));
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use tokio::io::BufReader;
	use tokio::sync::mpsc;

	use super::*;
	use crate::types::ResponseError;

	async fn read_request(reader: &mut BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>) -> AnyRequest {
		match Message::read(reader).await.unwrap().unwrap() {
			Message::Request(req) => req,
			other => panic!("expected request, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn correlates_out_of_order_responses() {
		let (host, peer) = tokio::io::duplex(4096);
		let (host_read, host_write) = tokio::io::split(host);
		let (notif_tx, _notif_rx) = mpsc::unbounded_channel();
		let conn = Connection::spawn(host_read, host_write, notif_tx);

		let peer_task = tokio::spawn(async move {
			let (peer_read, mut peer_write) = tokio::io::split(peer);
			let mut reader = BufReader::new(peer_read);
			let alpha = read_request(&mut reader).await;
			let beta = read_request(&mut reader).await;
			// Answer in reverse order.
			Message::Response(AnyResponse {
				id: beta.id,
				result: Some(json!("beta-result")),
				error: None,
			})
			.write(&mut peer_write)
			.await
			.unwrap();
			Message::Response(AnyResponse {
				id: alpha.id,
				result: Some(json!("alpha-result")),
				error: None,
			})
			.write(&mut peer_write)
			.await
			.unwrap();
		});

		let (alpha, beta) =
			tokio::join!(conn.request_raw("alpha", json!(1)), conn.request_raw("beta", json!(2)));
		assert_eq!(alpha.unwrap(), json!("alpha-result"));
		assert_eq!(beta.unwrap(), json!("beta-result"));
		peer_task.await.unwrap();
	}

	#[tokio::test]
	async fn error_responses_surface_to_the_caller() {
		let (host, peer) = tokio::io::duplex(4096);
		let (host_read, host_write) = tokio::io::split(host);
		let (notif_tx, _notif_rx) = mpsc::unbounded_channel();
		let conn = Connection::spawn(host_read, host_write, notif_tx);

		tokio::spawn(async move {
			let (peer_read, mut peer_write) = tokio::io::split(peer);
			let mut reader = BufReader::new(peer_read);
			let req = read_request(&mut reader).await;
			Message::Response(AnyResponse {
				id: req.id,
				result: None,
				error: Some(ResponseError { code: -32601, message: "no such method".into(), data: None }),
			})
			.write(&mut peer_write)
			.await
			.unwrap();
		});

		match conn.request_raw("bogus", json!(null)).await {
			Err(Error::Response(err)) => assert_eq!(err.code, -32601),
			other => panic!("expected response error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn notifications_arrive_in_order() {
		let (host, peer) = tokio::io::duplex(4096);
		let (host_read, host_write) = tokio::io::split(host);
		let (notif_tx, mut notif_rx) = mpsc::unbounded_channel();
		let _conn = Connection::spawn(host_read, host_write, notif_tx);

		tokio::spawn(async move {
			let (_peer_read, mut peer_write) = tokio::io::split(peer);
			for n in 0..3 {
				Message::Notification(AnyNotification {
					method: "tick".into(),
					params: json!(n),
				})
				.write(&mut peer_write)
				.await
				.unwrap();
			}
		});

		for n in 0..3 {
			let notif = notif_rx.recv().await.unwrap();
			assert_eq!(notif.method, "tick");
			assert_eq!(notif.params, json!(n));
		}
	}

	#[tokio::test]
	async fn pending_requests_fail_when_the_peer_closes() {
		let (host, peer) = tokio::io::duplex(4096);
		let (host_read, host_write) = tokio::io::split(host);
		let (notif_tx, _notif_rx) = mpsc::unbounded_channel();
		let conn = Connection::spawn(host_read, host_write, notif_tx);

		tokio::spawn(async move {
			let (peer_read, peer_write) = tokio::io::split(peer);
			let mut reader = BufReader::new(peer_read);
			let _req = read_request(&mut reader).await;
			drop((reader, peer_write));
		});

		match conn.request_raw("hang", json!(null)).await {
			Err(Error::ConnectionStopped) => {}
			other => panic!("expected stopped connection, got {other:?}"),
		}
		// Later calls fail the same way instead of queueing forever.
		while !conn.is_closed() {
			tokio::task::yield_now().await;
		}
		assert!(matches!(conn.request_raw("again", json!(null)).await, Err(Error::ConnectionStopped)));
	}

	#[tokio::test]
	async fn forgotten_requests_keep_queue_order() {
		let (host, peer) = tokio::io::duplex(4096);
		let (host_read, host_write) = tokio::io::split(host);
		let (notif_tx, _notif_rx) = mpsc::unbounded_channel();
		let conn = Connection::spawn(host_read, host_write, notif_tx);

		struct Fire;
		impl crate::Request for Fire {
			const METHOD: &'static str = "fire";
			type Params = String;
			type Result = JsonValue;
		}

		let peer_task = tokio::spawn(async move {
			let (peer_read, mut peer_write) = tokio::io::split(peer);
			let mut reader = BufReader::new(peer_read);
			let first = read_request(&mut reader).await;
			let second = read_request(&mut reader).await;
			for req in [&first, &second] {
				Message::Response(AnyResponse {
					id: req.id.clone(),
					result: Some(json!(null)),
					error: None,
				})
				.write(&mut peer_write)
				.await
				.unwrap();
			}
			(first.method, second.method)
		});

		conn.request_forget::<Fire>("payload".into()).unwrap();
		conn.request_raw("ask", json!(null)).await.unwrap();
		let (first, second) = peer_task.await.unwrap();
		assert_eq!(first, "fire");
		assert_eq!(second, "ask");
	}
}
