/*
 * Copyright 2020 Damian Peckett <damian@pecke.tt>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Evaluate `condition` every `period` until it holds or `timeout` has elapsed.
///
/// The first evaluation happens immediately. Returns `Ok(true)` once the condition
/// holds and `Ok(false)` if it still didn't after the deadline. Errors from the
/// condition end the poll straight away.
pub(crate) async fn poll_until<F, Fut, E>(
    period: Duration,
    timeout: Duration,
    mut condition: F,
) -> Result<bool, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + timeout;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if condition().await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn test_condition_holds_immediately() {
        let started = Instant::now();
        let polls = Cell::new(0);
        let settled = poll_until(Duration::from_secs(1), Duration::from_secs(10), || {
            polls.set(polls.get() + 1);
            async { Ok::<_, ()>(true) }
        })
        .await
        .unwrap();

        assert!(settled);
        assert_eq!(polls.get(), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_holds_eventually() {
        let started = Instant::now();
        let polls = Cell::new(0);
        let settled = poll_until(Duration::from_secs(1), Duration::from_secs(10), || {
            polls.set(polls.get() + 1);
            let done = polls.get() == 3;
            async move { Ok::<_, ()>(done) }
        })
        .await
        .unwrap();

        assert!(settled);
        assert_eq!(polls.get(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_times_out() {
        let started = Instant::now();
        let settled = poll_until(Duration::from_secs(1), Duration::from_secs(5), || async {
            Ok::<_, ()>(false)
        })
        .await
        .unwrap();

        assert!(!settled);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_error_ends_poll() {
        let polls = Cell::new(0);
        let result = poll_until(Duration::from_secs(1), Duration::from_secs(5), || {
            polls.set(polls.get() + 1);
            async { Err::<bool, &str>("api unavailable") }
        })
        .await;

        assert_eq!(result, Err("api unavailable"));
        assert_eq!(polls.get(), 1);
    }
}
