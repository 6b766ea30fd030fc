// SPDX-License-Identifier: Apache-2.0
//
// Copyright (C) 2024, ARM Limited and contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may
// not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::{
    cmp::{Ordering, Reverse},
    fmt::{Debug, Error, Formatter},
    iter::Iterator,
    ops::{Deref, DerefMut},
};
use std::collections::BinaryHeap;

use crate::{error::ParseError, event::LogEntry};

pub struct SavedIterator<I>
where
    I: Iterator,
{
    iter: I,
    item: Option<I::Item>,
}

impl<I> Debug for SavedIterator<I>
where
    I: std::iter::Iterator,
    <I as Iterator>::Item: Debug,
{
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_struct("SavedIterator")
            .field("item", &self.item)
            .finish_non_exhaustive()
    }
}

impl<I> PartialEq for SavedIterator<I>
where
    I: Iterator,
    <I as Iterator>::Item: PartialEq,
{
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.item == other.item
    }
}

impl<I> Eq for SavedIterator<I>
where
    I: Iterator,
    <I as Iterator>::Item: PartialEq,
{
}

impl<I> PartialOrd for SavedIterator<I>
where
    I: Iterator,
    <I as Iterator>::Item: PartialOrd,
{
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        PartialOrd::partial_cmp(&self.item, &other.item)
    }
}

impl<I> Ord for SavedIterator<I>
where
    I: Iterator,
    <I as Iterator>::Item: Ord,
{
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        Ord::cmp(&self.item, &other.item)
    }
}

/// k-way merge of iterators, each of them yielding items in ascending order.
pub struct MergedIterator<I>
where
    I: IntoIterator,
{
    curr: Reverse<SavedIterator<I::IntoIter>>,
    heap: BinaryHeap<Reverse<SavedIterator<I::IntoIter>>>,
}

impl<I> MergedIterator<I>
where
    I: IntoIterator,
    SavedIterator<<I as IntoIterator>::IntoIter>: Ord,
{
    pub fn new<II: IntoIterator<Item = I>>(iterators: II) -> Option<Self> {
        let mut iterators = iterators.into_iter().map(|i| i.into_iter());

        let first = iterators.next()?;
        let curr = Reverse(SavedIterator {
            item: None,
            iter: first,
        });

        let mut heap = BinaryHeap::with_capacity(iterators.size_hint().0);
        heap.extend(iterators.filter_map(|mut iter| match iter.next() {
            None => None,
            item => Some(Reverse(SavedIterator { item, iter })),
        }));

        Some(MergedIterator { curr, heap })
    }
}

impl<I> Iterator for MergedIterator<I>
where
    I: IntoIterator,
    SavedIterator<<I as IntoIterator>::IntoIter>: Ord,
{
    type Item = I::Item;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self.curr.0.iter.next() {
            // The current iterator is exhausted, switch to the lowest one in the heap.
            None => {
                self.curr = self.heap.pop()?;
            }
            new => {
                self.curr.0.item = new;
                // Swap the current iterator with the top of the heap if the heap has a lower
                // item to offer.
                if let Some(mut lowest) = self.heap.peek_mut() {
                    if lowest.deref() > &self.curr {
                        core::mem::swap(lowest.deref_mut(), &mut self.curr);
                    }
                }
            }
        }

        core::mem::take(&mut self.curr.0.item)
    }
}

/// Decoding result ordered by the timestamp of the entry.
///
/// Errors compare lower than any entry, so that they are reported as soon as they are
/// encountered in their stream.
#[derive(Debug)]
pub struct TimeOrdered(pub Result<LogEntry, ParseError>);

impl TimeOrdered {
    #[inline]
    fn key(&self) -> Option<(i64, u64)> {
        match &self.0 {
            Ok(entry) => Some((entry.timestamp, entry.continuous_time)),
            Err(_) => None,
        }
    }
}

impl PartialEq for TimeOrdered {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TimeOrdered {}

impl PartialOrd for TimeOrdered {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeOrdered {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Merge the entries of several files into a single stream ordered by timestamp.
///
/// Entries of each stream are expected in ascending timestamp order, which is how `tracev3`
/// files are written within a process. Out of order entries are passed through as they come.
pub fn merge_entries<II, I>(streams: II) -> impl Iterator<Item = Result<LogEntry, ParseError>>
where
    II: IntoIterator<Item = I>,
    I: IntoIterator<Item = Result<LogEntry, ParseError>>,
{
    let streams: Vec<_> = streams
        .into_iter()
        .map(|stream| stream.into_iter().map(TimeOrdered))
        .collect();
    MergedIterator::new(streams)
        .into_iter()
        .flatten()
        .map(|item| item.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    fn test(iterators: Vec<Vec<u32>>, expected: Vec<u32>) {
        let merged = MergedIterator::new(iterators).expect("No iterator to merge");
        assert_eq!(merged.collect::<Vec<_>>(), expected);
    }

    #[test]
    fn iterator_test() {
        test(vec![vec![1, 3, 5], vec![2, 4]], vec![1, 2, 3, 4, 5]);
        test(vec![vec![1, 3], vec![2, 4, 6]], vec![1, 2, 3, 4, 6]);

        test(vec![vec![1, 3, 5], vec![2, 4, 6]], vec![1, 2, 3, 4, 5, 6]);
        test(vec![vec![2, 4, 6], vec![1, 3, 5]], vec![1, 2, 3, 4, 5, 6]);
        test(vec![vec![], vec![2, 4, 6]], vec![2, 4, 6]);
        test(vec![vec![1, 3, 5], vec![]], vec![1, 3, 5]);

        test(
            vec![vec![7, 8, 9], vec![4, 5, 6], vec![1, 2, 3]],
            vec![1, 2, 3, 4, 5, 6, 7, 8, 9],
        );
        test(
            vec![vec![4, 6], vec![5], vec![1, 2, 3]],
            vec![1, 2, 3, 4, 5, 6],
        );
        test(vec![vec![4, 6], vec![], vec![1, 2, 3]], vec![1, 2, 3, 4, 6]);
        test(vec![vec![], vec![4, 6], vec![1, 2, 3]], vec![1, 2, 3, 4, 6]);
    }

    fn entry(timestamp: i64) -> Result<LogEntry, ParseError> {
        Ok(LogEntry::new(
            EventType::Log,
            uuid::Uuid::nil(),
            timestamp,
            timestamp as u64,
        ))
    }

    #[test]
    fn merge_entries_test() {
        let first = vec![entry(10), entry(30), Err(ParseError::TruncatedData), entry(50)];
        let second = vec![entry(20), entry(40), entry(60)];

        let merged: Vec<_> = merge_entries(vec![first, second])
            .map(|item| item.map(|entry| entry.timestamp))
            .collect();
        assert_eq!(
            merged,
            vec![
                Ok(10),
                Ok(20),
                Ok(30),
                Err(ParseError::TruncatedData),
                Ok(40),
                Ok(50),
                Ok(60),
            ]
        );

        assert_eq!(
            merge_entries(Vec::<Vec<Result<LogEntry, ParseError>>>::new()).count(),
            0
        );
    }
}
