use prio_queue::{Callback, Cfg, suite};

use crate::{ChanneledQueue, CondvarQueue};

struct CondvarTester;

impl suite::Tester<CondvarQueue<u64>> for CondvarTester {
    fn create_queue(&self, cfg: Cfg, callback: Option<Callback<u64>>) -> CondvarQueue<u64> {
        CondvarQueue::start(cfg, callback).expect("consumer thread starts")
    }
}

struct ChannelTester;

impl suite::Tester<ChanneledQueue<u64>> for ChannelTester {
    fn create_queue(&self, cfg: Cfg, callback: Option<Callback<u64>>) -> ChanneledQueue<u64> {
        ChanneledQueue::start(cfg, callback).expect("consumer thread starts")
    }
}

prio_queue::conformance_tests!(condvar, CondvarTester);
prio_queue::conformance_tests!(channels, ChannelTester);
