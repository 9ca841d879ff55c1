//! Operator methods on `Flowable`.
//!
//! Invariants every operator upholds:
//! - `on_subscribe` reaches the downstream before any other signal.
//! - A failing user callback cancels upstream before the error goes down.
//! - Nothing is delivered after a terminal signal.

use std::hash::Hash;
use std::sync::Arc;

use rivulet_core::error::FlowError;
use rivulet_flow::Flowable;

use crate::concat::concat;
use crate::filter::FilterPublisher;
use crate::flat_map::FlatMapPublisher;
use crate::map::MapPublisher;
use crate::merge::merge;
use crate::retry::RetryPublisher;
use crate::take::TakePublisher;
use crate::zip::ZipPublisher;

pub trait FlowableExt<T: Send + 'static> {
    /// Transform each item. A panic in `f` becomes `FlowError::Callback`.
    fn map<U, F>(&self, f: F) -> Flowable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static;

    /// Transform each item; an `Err` ends the stream with that error.
    fn try_map<U, E, F>(&self, f: F) -> Flowable<U>
    where
        U: Send + 'static,
        E: Into<FlowError> + 'static,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static;

    /// Keep items matching `predicate`.
    fn filter<P>(&self, predicate: P) -> Flowable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static;

    /// Suppress items equal to one already emitted on this subscription.
    fn distinct(&self) -> Flowable<T>
    where
        T: Eq + Hash + Clone;

    /// First `n` items, then complete.
    fn take(&self, n: u64) -> Flowable<T>;

    /// Resubscribe up to `times` times on errors accepted by `predicate`.
    fn retry<P>(&self, times: u64, predicate: P) -> Flowable<T>
    where
        P: Fn(&FlowError) -> bool + Send + Sync + 'static;

    fn merge_with(&self, other: Flowable<T>) -> Flowable<T>;

    fn concat_with(&self, other: Flowable<T>) -> Flowable<T>;

    /// Map each item to a `Flowable` and merge the results. At most the
    /// buffer capacity of inners run at once.
    fn flat_map<U, F>(&self, f: F) -> Flowable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flowable<U> + Send + Sync + 'static;

    /// Combine items pairwise with `other`; ends with the shorter source.
    fn zip_with<U, R, F>(&self, other: Flowable<U>, f: F) -> Flowable<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: Fn(T, U) -> R + Send + Sync + 'static;
}

impl<T: Send + 'static> FlowableExt<T> for Flowable<T> {
    fn map<U, F>(&self, f: F) -> Flowable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Flowable::from_publisher(MapPublisher::new(
            Arc::clone(self.publisher()),
            move |item: T| -> Result<U, FlowError> { Ok(f(item)) },
        ))
    }

    fn try_map<U, E, F>(&self, f: F) -> Flowable<U>
    where
        U: Send + 'static,
        E: Into<FlowError> + 'static,
        F: Fn(T) -> Result<U, E> + Send + Sync + 'static,
    {
        Flowable::from_publisher(MapPublisher::new(
            Arc::clone(self.publisher()),
            move |item: T| -> Result<U, FlowError> { f(item).map_err(Into::into) },
        ))
    }

    fn filter<P>(&self, predicate: P) -> Flowable<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Flowable::from_publisher(FilterPublisher::new(Arc::clone(self.publisher()), predicate))
    }

    fn distinct(&self) -> Flowable<T>
    where
        T: Eq + Hash + Clone,
    {
        Flowable::from_publisher(FilterPublisher::distinct(Arc::clone(self.publisher())))
    }

    fn take(&self, n: u64) -> Flowable<T> {
        Flowable::from_publisher(TakePublisher::new(Arc::clone(self.publisher()), n))
    }

    fn retry<P>(&self, times: u64, predicate: P) -> Flowable<T>
    where
        P: Fn(&FlowError) -> bool + Send + Sync + 'static,
    {
        Flowable::from_publisher(RetryPublisher::new(
            Arc::clone(self.publisher()),
            times,
            Arc::new(predicate),
        ))
    }

    fn merge_with(&self, other: Flowable<T>) -> Flowable<T> {
        merge([self.clone(), other])
    }

    fn concat_with(&self, other: Flowable<T>) -> Flowable<T> {
        concat([self.clone(), other])
    }

    fn flat_map<U, F>(&self, f: F) -> Flowable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flowable<U> + Send + Sync + 'static,
    {
        Flowable::from_publisher(FlatMapPublisher::new(Arc::clone(self.publisher()), f))
    }

    fn zip_with<U, R, F>(&self, other: Flowable<U>, f: F) -> Flowable<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        Flowable::from_publisher(ZipPublisher::new(
            Arc::clone(self.publisher()),
            Arc::clone(other.publisher()),
            f,
        ))
    }
}
