use std::hint::black_box;
use std::net::SocketAddr;
use std::sync::Arc;

use bencher::{TestCase, TestFile};
use bytes::BytesMut;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_reactor::buffer::{BufferReader, BufferWriter};
use micro_reactor::network::{Session, SessionHandler};
use micro_reactor::protocol::http::{HttpRequest, HttpSessionHandler, RequestCallback, Responder};
use micro_reactor::protocol::websocket::{Frame, FrameHeader, FrameState, OpCode, apply_mask};

static SMALL_HEADER: TestFile = TestFile::new("get_small.txt", include_bytes!("../resources/request/get_small.txt"));
static LARGE_HEADER: TestFile = TestFile::new("get_large.txt", include_bytes!("../resources/request/get_large.txt"));
static POST_FORM: TestFile = TestFile::new("post_form.txt", include_bytes!("../resources/request/post_form.txt"));

const CHUNK_SIZES: [usize; 3] = [64, 1024, 16 * 1024];

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::new("small_header", SMALL_HEADER),
        TestCase::new("large_header", LARGE_HEADER),
        TestCase::new("post_form", POST_FORM),
    ]
}

fn benchmark_getline(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("buffer_getline");

    for case in create_test_cases() {
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        for chunk_size in CHUNK_SIZES {
            let id = BenchmarkId::new(case.name(), chunk_size);
            group.bench_with_input(id, &case, |b, case| {
                b.iter_batched_ref(
                    || case.file().to_buffer(chunk_size),
                    |buffer| {
                        let mut reader = BufferReader::new(buffer);
                        let mut line = String::new();
                        while reader.getline(&mut line).is_ok() {
                            black_box(&line);
                        }
                    },
                    BatchSize::SmallInput,
                );
            });
        }
    }

    group.finish();
}

fn benchmark_request_parser(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_parser");
    let callback: RequestCallback = Arc::new(|request: HttpRequest, _responder: Responder| {
        black_box(request);
    });
    let peer = SocketAddr::from(([127, 0, 0, 1], 8080));

    for case in create_test_cases() {
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            b.iter_batched_ref(
                || {
                    let mut session = Session::detached(peer, 1024);
                    BufferWriter::new(session.input_mut()).write(case.file().content());
                    HttpSessionHandler::new(session, Arc::clone(&callback))
                },
                |handler| {
                    handler.handle_session().expect("input should be a valid http request");
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// A client message of `len` bytes, masked and cut into `fragments` frames.
fn masked_message(len: usize, fragments: usize) -> Vec<u8> {
    let key = [0x37, 0xfa, 0x21, 0x3d];
    let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let mut dst = BytesMut::new();
    let mut opcode = OpCode::Binary;
    let mut pieces = payload.chunks(len.div_ceil(fragments)).peekable();
    while let Some(piece) = pieces.next() {
        let mut header = FrameHeader::new(opcode, pieces.peek().is_none(), piece.len() as u64);
        header.mask = Some(key);
        header.encode(&mut dst);
        let mut masked = piece.to_vec();
        apply_mask(&mut masked, key, 0);
        dst.extend_from_slice(&masked);
        opcode = OpCode::Continuation;
    }
    dst.to_vec()
}

fn benchmark_frame_parser(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("frame_parser");

    for (len, fragments) in [(125, 1), (4096, 1), (4096, 16), (70_000, 4)] {
        let bytes = masked_message(len, fragments);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new(format!("{len}_bytes"), fragments), &bytes, |b, bytes| {
            b.iter_batched_ref(
                || {
                    let mut buffer = micro_reactor::buffer::Buffer::new();
                    BufferWriter::new(&mut buffer).write(bytes);
                    buffer
                },
                |buffer| {
                    let mut reader = BufferReader::new(buffer);
                    let mut frame = Frame::new();
                    while frame.parse_from(&mut reader).expect("input should be valid frames") == FrameState::Complete {
                        black_box(frame.payload());
                        frame.reset();
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_getline, benchmark_request_parser, benchmark_frame_parser);
criterion_main!(decoder);
