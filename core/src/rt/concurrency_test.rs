//! Tests for channels, tasks and the shared runtime

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crate::error::{ErrorKind, VmError};
    use crate::rt::{self, CancelToken, ExecContext, with_runtime};
    use crate::val::{ChannelValue, TaskValue, Val};

    #[test]
    fn test_runtime_is_created_lazily_and_reused() {
        rt::init_runtime().unwrap();
        let before = with_runtime(|rt| Ok(rt.stats().spawned_tasks)).unwrap();
        let task = TaskValue::new();
        let handle = task.clone();
        with_runtime(|rt| {
            rt.spawn_blocking(move || handle.complete(Ok(Val::Int(1))));
            Ok(())
        })
        .unwrap();
        assert_eq!(task.wait(&CancelToken::new()).unwrap(), Val::Int(1));
        let after = with_runtime(|rt| Ok(rt.stats().spawned_tasks)).unwrap();
        assert!(after > before);
    }

    #[test]
    fn test_channel_buffers_until_full() {
        let chan = ChannelValue::new(2);
        let cancel = CancelToken::new();
        chan.send(Val::Int(1), &cancel).unwrap();
        chan.send(Val::Int(2), &cancel).unwrap();
        assert_eq!(chan.len(), 2);
        assert_eq!(chan.recv(&cancel).unwrap(), Some(Val::Int(1)));
        assert_eq!(chan.recv(&cancel).unwrap(), Some(Val::Int(2)));
        assert!(chan.is_empty());
    }

    #[test]
    fn test_closed_channel_drains_then_reports_none() {
        let chan = ChannelValue::new(1);
        let cancel = CancelToken::new();
        chan.send(Val::from("last"), &cancel).unwrap();
        chan.close().unwrap();
        assert!(chan.is_closed());
        assert_eq!(chan.recv(&cancel).unwrap(), Some(Val::from("last")));
        assert_eq!(chan.recv(&cancel).unwrap(), None);

        let err = chan.send(Val::Nil, &cancel).unwrap_err();
        assert_eq!(VmError::kind_of(&err), ErrorKind::Channel);
        assert!(chan.close().is_err());
    }

    #[test]
    fn test_rendezvous_channel_across_threads() {
        let chan = ChannelValue::new(0);
        let producer = {
            let chan = chan.clone();
            std::thread::spawn(move || {
                let cancel = CancelToken::new();
                for i in 0..3 {
                    chan.send(Val::Int(i), &cancel).unwrap();
                }
                chan.close().unwrap();
            })
        };
        let cancel = CancelToken::new();
        let mut received = Vec::new();
        while let Some(v) = chan.recv(&cancel).unwrap() {
            received.push(v);
        }
        producer.join().unwrap();
        assert_eq!(received, vec![Val::Int(0), Val::Int(1), Val::Int(2)]);
    }

    #[test]
    fn test_blocked_receive_observes_cancellation() {
        let chan = ChannelValue::new(0);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            trigger.cancel();
        });
        let err = chan.recv(&cancel).unwrap_err();
        canceller.join().unwrap();
        assert_eq!(VmError::kind_of(&err), ErrorKind::Cancelled);
    }

    #[test]
    fn test_task_result_seen_by_every_waiter() {
        let task = TaskValue::new();
        assert!(!task.is_done());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let task = Arc::clone(&task);
                std::thread::spawn(move || task.wait(&CancelToken::new()).unwrap())
            })
            .collect();
        std::thread::sleep(Duration::from_millis(10));
        task.complete(Ok(Val::from("done")));
        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Val::from("done"));
        }
        assert!(task.is_done());
    }

    #[test]
    fn test_task_failure_keeps_its_kind() {
        let task = TaskValue::new();
        task.complete(Err(VmError::new(ErrorKind::Type, "bad operand")));
        let err = task.wait(&CancelToken::new()).unwrap_err();
        assert_eq!(VmError::kind_of(&err), ErrorKind::Type);
        assert_eq!(err.to_string(), "type error: bad operand");
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            trigger.cancel();
        });
        let started = Instant::now();
        assert!(rt::sleep(Duration::from_secs(10), &cancel).is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_exec_context_timeout() {
        let ctx = ExecContext::with_timeout(Duration::from_millis(20)).unwrap();
        let started = Instant::now();
        while !ctx.is_cancelled() {
            assert!(started.elapsed() < Duration::from_secs(5), "timeout never fired");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(ctx.token().check().is_err());
    }
}
