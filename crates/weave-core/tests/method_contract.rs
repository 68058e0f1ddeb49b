//! `method_contract` 集成测试：验证方法端口的往返、串行化与错误透传契约。
//!
//! # 测试目标（Why）
//! - 请求/应答是织网之上唯一的双向原语，完成体的唤醒正确性直接决定调用方
//!   会不会悬死；
//! - 业务错误必须原样透传，队列容量与限期的失败形态必须与发射路径同一套
//!   语义。
//!
//! # 结构安排（How）
//! - 往返与并发调用共享一个后台工作线程（即普通的 `process` 循环）；
//! - 容量与超时用例刻意不起工作线程，以构造确定性的失败路径；
//! - 空请求/空应答侧用 `()` 覆盖。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use weave_core::{EventQueue, MethodPort, Wait, WeaveError};

struct ChannelQuery {
    channel: u8,
}

#[derive(Debug)]
struct ChannelReading {
    value: i32,
    sequence: u32,
}

/// 启动一个普通的事件处理循环作为方法端口的服务线程。
fn spawn_worker(queue: &EventQueue, stop: &Arc<AtomicBool>) -> thread::JoinHandle<()> {
    let queue = queue.clone();
    let stop = Arc::clone(stop);
    thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            let _ = queue.process(Wait::Timeout(Duration::from_millis(10)));
        }
    })
}

/// 往返调用：应答按处理器逻辑生成，并发的第二次调用同样成功。
#[test]
fn call_round_trip_with_concurrency() {
    let queue = EventQueue::bounded(4);
    let sequence = Arc::new(AtomicU32::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let sequence_in_handler = Arc::clone(&sequence);
    let in_flight_in_handler = Arc::clone(&in_flight);
    let port = MethodPort::new("sensor.read", &queue, move |query: ChannelQuery| {
        let concurrent = in_flight_in_handler.fetch_add(1, Ordering::SeqCst);
        assert_eq!(concurrent, 0, "同一队列上的调用必须串行执行");
        thread::sleep(Duration::from_millis(2));
        let reading = ChannelReading {
            value: i32::from(query.channel) * 10,
            sequence: sequence_in_handler.fetch_add(1, Ordering::SeqCst) + 1,
        };
        in_flight_in_handler.fetch_sub(1, Ordering::SeqCst);
        Ok(reading)
    });

    let stop = Arc::new(AtomicBool::new(false));
    let worker = spawn_worker(&queue, &stop);

    let second_port = port.clone();
    let second_call = thread::spawn(move || {
        second_port.call(
            ChannelQuery { channel: 5 },
            Wait::Timeout(Duration::from_secs(1)),
        )
    });

    let reply = port
        .call(
            ChannelQuery { channel: 4 },
            Wait::Timeout(Duration::from_secs(1)),
        )
        .expect("调用应当成功");
    assert_eq!(reply.value, 40);
    assert!(reply.sequence >= 1, "应答应携带处理序号");

    let second_reply = second_call
        .join()
        .expect("并发调用线程平稳退出")
        .expect("并发调用应当成功");
    assert_eq!(second_reply.value, 50);
    assert_eq!(sequence.load(Ordering::SeqCst), 2);

    stop.store(true, Ordering::SeqCst);
    worker.join().expect("工作线程平稳退出");
}

/// 处理器的业务错误原样透传给调用方。
#[test]
fn handler_errors_propagate_verbatim() {
    let queue = EventQueue::bounded(2);
    let port: MethodPort<ChannelQuery, ChannelReading> =
        MethodPort::new("sensor.read", &queue, |_query| {
            Err(WeaveError::application(
                "sensor.unavailable",
                "probe is detached",
            ))
        });

    let stop = Arc::new(AtomicBool::new(false));
    let worker = spawn_worker(&queue, &stop);

    let error = port
        .call(
            ChannelQuery { channel: 1 },
            Wait::Timeout(Duration::from_secs(1)),
        )
        .expect_err("业务错误必须透传");
    assert_eq!(error.code(), "sensor.unavailable");

    stop.store(true, Ordering::SeqCst);
    worker.join().expect("工作线程平稳退出");
}

/// 容量与限期的失败形态：满队不等待报 `NoSpace`，无服务线程时等待超时。
#[test]
fn queue_capacity_and_timeout_failures() {
    let queue = EventQueue::bounded(1);
    let port: MethodPort<u8, u8> = MethodPort::new("echo", &queue, |byte| Ok(byte));

    // 无服务线程：入队成功但完成等待立即超时。
    let error = port.call(1, Wait::NoWait).expect_err("无人应答必须超时");
    assert!(matches!(error, WeaveError::Timeout));

    // 队列仍被首个调用占满：第二个不等待的调用报容量耗尽。
    let error = port.call(2, Wait::NoWait).expect_err("满队不等待必须拒绝");
    assert!(matches!(error, WeaveError::NoSpace { .. }));

    // 迟到的服务线程完成首个调用：结果无人认领，安静丢弃而非悬垂。
    queue.process(Wait::NoWait).expect("回放积压调用");
}

/// 空请求 / 空应答侧以 `()` 表达。
#[test]
fn void_sides_round_trip() {
    let queue = EventQueue::bounded(2);
    let pinged = Arc::new(AtomicUsize::new(0));
    let pinged_in_handler = Arc::clone(&pinged);
    let port: MethodPort<(), ()> = MethodPort::new("ping", &queue, move |()| {
        pinged_in_handler.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let stop = Arc::new(AtomicBool::new(false));
    let worker = spawn_worker(&queue, &stop);

    port.call((), Wait::Timeout(Duration::from_secs(1)))
        .expect("空载调用应当成功");
    assert_eq!(pinged.load(Ordering::SeqCst), 1);

    stop.store(true, Ordering::SeqCst);
    worker.join().expect("工作线程平稳退出");
}
