use std::{
    mem,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use super::{DeferredValue, Failure, Outcome, RequestId, TaskExecutor, catch, lock};

/// Relays a failure of an earlier stage to a dependent one.
fn relay<T>(outcome: &Outcome<T>) -> Result<&T, Failure> {
    outcome.as_ref().map_err(Failure::upstream)
}

impl<T: Send + Sync + 'static> DeferredValue<T> {
    /// Returns a dependent holding `f(value)` once this value completes
    /// successfully.
    ///
    /// `f` runs on the thread completing this value. A failure of this value
    /// is relayed without invoking `f`, and a panic in `f` fails the
    /// dependent.
    pub fn map<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        let dependent = self.dependent();
        let d = dependent.clone();
        self.subscribe(move |outcome| {
            _ = d.complete_with(relay(outcome).and_then(|v| catch(|| f(v))));
        });
        dependent
    }

    /// Same as [`DeferredValue::map`], but `f` may fail.
    pub fn try_map<U, E, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Send + Sync + 'static,
        E: Into<Failure>,
        F: FnOnce(&T) -> Result<U, E> + Send + 'static,
    {
        let dependent = self.dependent();
        let d = dependent.clone();
        self.subscribe(move |outcome| {
            let res = relay(outcome)
                .and_then(|v| catch(|| f(v)))
                .and_then(|r| r.map_err(Into::into));
            _ = d.complete_with(res);
        });
        dependent
    }

    /// Same as [`DeferredValue::map`], but `f` is submitted to `executor`
    /// instead of running on the completing thread.
    pub fn map_async<U, F, E>(&self, f: F, executor: E) -> DeferredValue<U>
    where
        T: Clone,
        U: Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
        E: TaskExecutor + 'static,
    {
        let dependent = self.dependent();
        let d = dependent.clone();
        self.subscribe(move |outcome| match outcome {
            Ok(v) => {
                let v = v.clone();
                executor.execute(Box::new(move || _ = d.complete_with(catch(|| f(v)))));
            }
            Err(e) => _ = d.complete_exceptionally(e.upstream()),
        });
        dependent
    }

    /// Chains an asynchronous computation: the dependent completes once the
    /// value returned by `f` does.
    pub fn and_then<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(&T) -> DeferredValue<U> + Send + 'static,
    {
        let dependent = self.dependent();
        let d = dependent.clone();
        self.subscribe(move |outcome| match relay(outcome).and_then(|v| catch(|| f(v))) {
            Ok(next) => next.subscribe(move |inner| {
                _ = d.complete_with(relay(inner).cloned());
            }),
            Err(e) => _ = d.complete_exceptionally(e),
        });
        dependent
    }

    /// Runs `f` once this value completes, in any fashion.
    ///
    /// The dependent mirrors this value. If `f` returns an error or panics,
    /// that becomes the dependent's failure; when this value had failed
    /// already, it is attached to that failure as suppressed instead of
    /// replacing it.
    pub fn on_complete<E, F>(&self, f: F) -> Self
    where
        T: Clone,
        E: Into<Failure>,
        F: FnOnce(Result<&T, &Failure>) -> Result<(), E> + Send + 'static,
    {
        let dependent = self.dependent();
        let d = dependent.clone();
        self.subscribe(move |outcome| {
            let observed = catch(|| f(outcome.as_ref())).and_then(|r| r.map_err(Into::into));
            let res = match (outcome, observed) {
                (Ok(v), Ok(())) => Ok(v.clone()),
                (Ok(_), Err(e)) => Err(e),
                (Err(src), Ok(())) => Err(src.upstream()),
                (Err(src), Err(e)) => Err(src.with_suppressed(e)),
            };
            _ = d.complete_with(res);
        });
        dependent
    }

    /// Returns a dependent holding `f` applied to the outcome of this value,
    /// whichever it is.
    pub fn handle<U, F>(&self, f: F) -> DeferredValue<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(Result<&T, &Failure>) -> U + Send + 'static,
    {
        let dependent = self.dependent();
        let d = dependent.clone();
        self.subscribe(move |outcome| {
            _ = d.complete_with(catch(|| f(outcome.as_ref())));
        });
        dependent
    }

    /// Returns a dependent that turns a failure of this value into a value
    /// using `f`.
    pub fn recover<F>(&self, f: F) -> Self
    where
        T: Clone,
        F: FnOnce(&Failure) -> T + Send + 'static,
    {
        let dependent = self.dependent();
        let d = dependent.clone();
        self.subscribe(move |outcome| {
            _ = d.complete_with(match outcome {
                Ok(v) => Ok(v.clone()),
                Err(e) => catch(|| f(e)),
            });
        });
        dependent
    }

    /// Races this value against `other`, applying `f` to whichever completes
    /// first.
    ///
    /// A later completion of the loser is ignored by this continuation.
    pub fn first_of<U, F>(&self, other: &Self, f: F) -> DeferredValue<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        let dependent = self.dependent();
        let claim = Arc::new(Mutex::new(Some(f)));
        for source in [self, other] {
            let d = dependent.clone();
            let claim = Arc::clone(&claim);
            source.subscribe(move |outcome| {
                let Some(f) = lock(&claim).take() else {
                    return;
                };
                _ = d.complete_with(relay(outcome).and_then(|v| catch(|| f(v))));
            });
        }
        dependent
    }

    /// Returns a dependent completing with whichever of `values` completes
    /// first.
    ///
    /// With no `values` at all, the returned value never completes.
    pub fn any_of(values: &[Self]) -> Self
    where
        T: Clone,
    {
        let dependent = Self::pending(values.first().and_then(Self::owner));
        for source in values {
            let d = dependent.clone();
            source.subscribe(move |outcome| _ = d.complete_with(relay(outcome).cloned()));
        }
        dependent
    }

    /// Returns a dependent combining the values of this one and `other`
    /// with `f`, once both completed.
    ///
    /// If both fail, the failure of this value wins.
    pub fn combine<U, V, F>(&self, other: &DeferredValue<U>, f: F) -> DeferredValue<V>
    where
        U: Send + Sync + 'static,
        V: Send + Sync + 'static,
        F: FnOnce(&T, &U) -> V + Send + 'static,
    {
        let dependent = self.dependent();
        let d = dependent.clone();
        // Only a weak handle may sit in the own continuation list.
        let first = Arc::downgrade(&self.inner);
        let second = other.clone();
        self.subscribe(move |_| {
            let Some(first) = first.upgrade().map(DeferredValue::from_inner) else {
                return;
            };
            second.subscribe(move |b| {
                let res = match (first.peek(), b) {
                    (Some(Ok(a)), Ok(b)) => catch(|| f(a, b)),
                    (Some(Err(e)), _) | (_, Err(e)) => Err(e.upstream()),
                    (None, _) => return,
                };
                _ = d.complete_with(res);
            });
        });
        dependent
    }

    /// Pairs the values of this one and `other` once both completed.
    pub fn zip<U>(&self, other: &DeferredValue<U>) -> DeferredValue<(T, U)>
    where
        T: Clone,
        U: Clone + Send + Sync + 'static,
    {
        self.combine(other, |a, b| (a.clone(), b.clone()))
    }

    /// Returns a value holding the values of all `values`, in order, once
    /// every one of them completed.
    ///
    /// Fails with the failure of the first failed input (in input order), but
    /// only after all inputs completed: no input is cancelled early.
    pub fn combine_all(values: Vec<Self>) -> DeferredValue<Vec<T>>
    where
        T: Clone,
    {
        let owner = values.first().and_then(Self::owner);
        let mut builder = CombinedBuilder::of_expected_size(values.len());
        for v in values {
            builder.add(v);
        }
        builder.await_all_in(owner)
    }

    /// Runs `f` on `executor`, completing the returned value with its result.
    pub fn supply_async<F, E>(owner: Option<RequestId>, f: F, executor: &E) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
        E: TaskExecutor + ?Sized,
    {
        let value = Self::pending(owner);
        let d = value.clone();
        executor.execute(Box::new(move || _ = d.complete_with(catch(f))));
        value
    }
}

enum Slots<T> {
    Empty,
    Single(Option<DeferredValue<T>>),
    Many(Vec<DeferredValue<T>>),
}

/// Collects a known number of values to await together.
///
/// Building for zero or one value avoids any intermediate collection. Adding
/// a different number of values than declared is a bug in the caller and
/// panics on [`CombinedBuilder::await_all`].
pub struct CombinedBuilder<T> {
    expected: usize,
    added: usize,
    slots: Slots<T>,
}

impl<T: Clone + Send + Sync + 'static> CombinedBuilder<T> {
    /// Creates a builder for exactly `expected` values.
    pub fn of_expected_size(expected: usize) -> Self {
        let slots = match expected {
            0 => Slots::Empty,
            1 => Slots::Single(None),
            n => Slots::Many(Vec::with_capacity(n)),
        };
        Self {
            expected,
            added: 0,
            slots,
        }
    }

    /// Adds the next value.
    pub fn add(&mut self, value: DeferredValue<T>) {
        match &mut self.slots {
            Slots::Single(slot @ None) => *slot = Some(value),
            Slots::Many(values) => values.push(value),
            Slots::Empty | Slots::Single(Some(_)) => {}
        }
        self.added += 1;
    }

    /// Number of values added so far.
    pub fn len(&self) -> usize {
        self.added
    }

    /// Indicates whether no value was added yet.
    pub fn is_empty(&self) -> bool {
        self.added == 0
    }

    /// Returns a value completing once all added values completed.
    ///
    /// # Panics
    ///
    /// If the number of added values differs from the declared one.
    pub fn await_all(self) -> DeferredValue<Vec<T>> {
        self.await_all_in(None)
    }

    fn await_all_in(self, owner: Option<RequestId>) -> DeferredValue<Vec<T>> {
        assert_eq!(
            self.added, self.expected,
            "expected {} values to be added, got {}",
            self.expected, self.added,
        );
        match self.slots {
            Slots::Empty | Slots::Single(None) => DeferredValue::resolved(owner, Ok(vec![])),
            Slots::Single(Some(value)) => {
                let dependent = DeferredValue::pending(owner);
                let d = dependent.clone();
                value.subscribe(move |outcome| {
                    _ = d.complete_with(relay(outcome).map(|v| vec![v.clone()]));
                });
                dependent
            }
            Slots::Many(values) => all_of(owner, values),
        }
    }
}

fn all_of<T>(owner: Option<RequestId>, values: Vec<DeferredValue<T>>) -> DeferredValue<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let dependent = DeferredValue::pending(owner);
    let slots: Arc<Mutex<Vec<Option<Outcome<T>>>>> =
        Arc::new(Mutex::new(vec![None; values.len()]));
    let remaining = Arc::new(AtomicUsize::new(values.len()));
    for (idx, value) in values.iter().enumerate() {
        let d = dependent.clone();
        let slots = Arc::clone(&slots);
        let remaining = Arc::clone(&remaining);
        value.subscribe(move |outcome| {
            lock(&slots)[idx] = Some(outcome.clone());
            if remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }
            let res = mem::take(&mut *lock(&slots))
                .into_iter()
                .map(|slot| match slot {
                    Some(Ok(v)) => Ok(v),
                    Some(Err(e)) => Err(e.upstream()),
                    None => Err(Failure::Cancelled),
                })
                .collect();
            _ = d.complete_with(res);
        });
    }
    dependent
}

/// Maps every item of `items` to a deferred value with `f` and awaits them
/// all.
///
/// A panic in `f` fails the whole result instead of unwinding into the
/// caller.
pub fn each<I, T, U, F>(items: I, mut f: F) -> DeferredValue<Vec<U>>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: ExactSizeIterator,
    U: Clone + Send + Sync + 'static,
    F: FnMut(T, usize) -> DeferredValue<U>,
{
    let items = items.into_iter();
    let mut builder = CombinedBuilder::of_expected_size(items.len());
    for (idx, item) in items.enumerate() {
        builder.add(catch(|| f(item, idx)).unwrap_or_else(DeferredValue::failed));
    }
    builder.await_all()
}

/// Same as [`each`], but starts the computation for an item only after the
/// one for the previous item completed.
///
/// `f` additionally sees the values produced so far. The first failure stops
/// the iteration and fails the result.
pub fn each_sequentially<I, T, U, F>(items: I, f: F) -> DeferredValue<Vec<U>>
where
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    U: Clone + Send + Sync + 'static,
    F: FnMut(T, usize, &[U]) -> DeferredValue<U> + Send + 'static,
{
    let overall = DeferredValue::new();
    step(items.into_iter(), f, vec![], overall.clone());
    overall
}

fn step<I, T, U, F>(mut items: I, mut f: F, mut acc: Vec<U>, overall: DeferredValue<Vec<U>>)
where
    I: Iterator<Item = T> + Send + 'static,
    U: Clone + Send + Sync + 'static,
    F: FnMut(T, usize, &[U]) -> DeferredValue<U> + Send + 'static,
{
    loop {
        let Some(item) = items.next() else {
            _ = overall.complete(acc);
            return;
        };
        let next = catch(|| f(item, acc.len(), &acc)).unwrap_or_else(DeferredValue::failed);
        match next.peek() {
            Some(Ok(v)) => acc.push(v.clone()),
            Some(Err(e)) => {
                _ = overall.complete_exceptionally(e.upstream());
                return;
            }
            None => {
                next.subscribe(move |outcome| match outcome {
                    Ok(v) => {
                        acc.push(v.clone());
                        step(items, f, acc, overall);
                    }
                    Err(e) => _ = overall.complete_exceptionally(e.upstream()),
                });
                return;
            }
        }
    }
}

/// Invokes `f`, turning a panic into a failed value.
pub fn try_catch<T, F>(f: F) -> DeferredValue<T>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> DeferredValue<T>,
{
    catch(f).unwrap_or_else(DeferredValue::failed)
}
