//! The blocking native client against a live server.

use std::thread;
use std::time::{Duration, Instant};

use collabcanvas_core::{
    ClientEvent, CollaborationManager, DrawCommand, NativeWebSocket, RecordingSurface, ShapeGeometry,
};
use collabcanvas_server::{ServerConfig, serve};
use kurbo::Size;
use tokio::net::TcpListener;

struct Peer {
    ws: NativeWebSocket,
    canvas: CollaborationManager<RecordingSurface>,
    seen: Vec<ClientEvent>,
}

impl Peer {
    fn connect(url: &str) -> Self {
        Self {
            ws: NativeWebSocket::connect(url).unwrap(),
            canvas: CollaborationManager::new(RecordingSurface::new(Size::new(800.0, 600.0))),
            seen: Vec::new(),
        }
    }

    fn pump(&mut self) {
        let changes = self.ws.pump(&mut self.canvas).unwrap();
        self.seen.extend(changes);
    }

    fn replays(&self) -> usize {
        self.seen
            .iter()
            .filter(|e| matches!(e, ClientEvent::Replayed { .. }))
            .count()
    }

    fn commands(&self) -> &[DrawCommand] {
        self.canvas.engine().surface().commands()
    }

    fn has(&self, wanted: impl Fn(&DrawCommand) -> bool) -> bool {
        self.commands().iter().any(wanted)
    }
}

/// Pump both peers until `done` holds.
fn settle(a: &mut Peer, b: &mut Peer, what: &str, done: impl Fn(&Peer, &Peer) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        a.pump();
        b.pump();
        if done(a, b) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

async fn start_test_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, ServerConfig::default(), std::future::pending())
            .await
            .unwrap();
    });
    format!("ws://{addr}/ws")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_native_clients_converge() {
    let url = start_test_server().await;

    tokio::task::spawn_blocking(move || {
        let mut alice = Peer::connect(&url);
        let mut bob = Peer::connect(&url);

        settle(&mut alice, &mut bob, "both joined", |a, b| {
            a.replays() >= 1 && b.replays() >= 1 && a.canvas.users().len() == 2 && b.canvas.users().len() == 2
        });

        alice.canvas.begin_stroke(0.1, 0.1);
        alice.canvas.extend_stroke(0.2, 0.2, Instant::now());
        alice.canvas.end_stroke();
        bob.canvas.place_shape(ShapeGeometry::Rect {
            x_norm: 0.5,
            y_norm: 0.5,
            w_norm: 0.1,
            h_norm: 0.1,
        });

        settle(&mut alice, &mut bob, "relayed drawing", |a, b| {
            a.has(|c| matches!(c, DrawCommand::Rect { .. })) && b.has(|c| matches!(c, DrawCommand::Line { .. }))
        });

        let (ra, rb) = (alice.replays(), bob.replays());
        alice.canvas.request_init();
        bob.canvas.request_init();
        settle(&mut alice, &mut bob, "resync", |a, b| a.replays() > ra && b.replays() > rb);

        assert_eq!(alice.commands(), bob.commands());
        assert!(alice.has(|c| matches!(c, DrawCommand::Line { .. })));
        assert!(alice.has(|c| matches!(c, DrawCommand::Rect { .. })));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_departure_reaches_native_client() {
    let url = start_test_server().await;

    tokio::task::spawn_blocking(move || {
        let mut alice = Peer::connect(&url);
        let mut bob = Peer::connect(&url);
        settle(&mut alice, &mut bob, "both joined", |a, _| a.canvas.users().len() == 2);

        drop(bob);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !alice.seen.iter().any(|e| matches!(e, ClientEvent::UserLeft { .. })) {
            assert!(Instant::now() < deadline, "timed out waiting for departure");
            alice.pump();
            thread::sleep(Duration::from_millis(10));
        }
        assert!(alice.ws.is_open());
    })
    .await
    .unwrap();
}
