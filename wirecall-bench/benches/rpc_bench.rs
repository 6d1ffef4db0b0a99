//! Echo call latency over an in-memory pipe.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use wirecall_protocol::{Envelope, EnvelopeCodec, JsonRegistry, Payload};
use wirecall_rpc::{Endpoint, ReplyContext};
use wirecall_session::Session;

#[derive(Serialize, Deserialize)]
struct Echo {
    message: String,
}

struct Setup {
    client: Arc<Endpoint<Payload>>,
    session: Session<Envelope<Payload>>,
    _server_session: Session<Envelope<Payload>>,
}

fn setup(rt: &Runtime) -> Setup {
    let mut registry = JsonRegistry::new();
    registry.register::<Echo>("bench.Echo");
    let registry = Arc::new(registry);

    rt.block_on(async {
        let (a, b) = tokio::io::duplex(256 * 1024);
        let session = Session::new(a, EnvelopeCodec::new(registry.clone()));
        let server_session = Session::new(b, EnvelopeCodec::new(registry));

        let server = Arc::new(Endpoint::<Payload>::new());
        server
            .server()
            .register("bench.Echo", |data: Payload, ctx: ReplyContext<Payload>| {
                let _ = ctx.reply_ok(data);
            });
        server.attach(&server_session).unwrap();

        let client = Arc::new(Endpoint::<Payload>::new());
        client.attach(&session).unwrap();

        Setup {
            client,
            session,
            _server_session: server_session,
        }
    })
}

fn bench_echo_call(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup(&rt);

    let mut group = c.benchmark_group("rpc_echo");
    group.throughput(Throughput::Elements(1));

    group.bench_function("call", |b| {
        b.to_async(&rt).iter(|| async {
            let reply = setup
                .client
                .client()
                .call(
                    &setup.session,
                    "bench.Echo",
                    Payload::new(Echo {
                        message: "ping".to_string(),
                    }),
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
            black_box(reply)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_echo_call);
criterion_main!(benches);
