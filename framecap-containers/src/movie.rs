//! Playhead and selection model on top of a [`MovieReader`].

use crate::traits::MovieReader;
use framecap_core::error::Result;
use framecap_core::{Format, Rational};
use tracing::trace;

/// A change to the movie model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovieEvent {
    /// The playhead moved.
    Playhead { old: Rational, new: Rational },
    /// The selection start changed.
    SelectionStart { old: Rational, new: Rational },
    /// The selection end changed.
    SelectionEnd { old: Rational, new: Rational },
}

/// Handle returned by [`Movie::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&MovieEvent) + Send>;

/// A movie backed by a reader, with a playhead and a selection `[in, out]`.
///
/// The selection initially spans the whole movie. Listeners are only notified
/// when a value actually changes.
pub struct Movie<R: MovieReader> {
    reader: R,
    playhead: Rational,
    selection_start: Rational,
    selection_end: Rational,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl<R: MovieReader> Movie<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        let selection_end = reader.movie_duration();
        Self {
            reader,
            playhead: Rational::ZERO,
            selection_start: Rational::ZERO,
            selection_end,
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Give back the reader.
    pub fn into_reader(self) -> R {
        self.reader
    }

    pub fn duration(&self) -> Rational {
        self.reader.movie_duration()
    }

    pub fn track_count(&self) -> usize {
        self.reader.track_count()
    }

    pub fn format(&self, track: usize) -> Option<&Format> {
        self.reader.format(track)
    }

    pub fn file_format(&self) -> Format {
        self.reader.file_format()
    }

    pub fn time_to_sample(&self, track: usize, time: Rational) -> Result<usize> {
        self.reader.time_to_sample(track, time)
    }

    pub fn sample_to_time(&self, track: usize, sample: usize) -> Result<Rational> {
        self.reader.sample_to_time(track, sample)
    }

    /// Current playhead (insertion point).
    pub fn playhead(&self) -> Rational {
        self.playhead
    }

    pub fn set_playhead(&mut self, new: Rational) {
        let old = std::mem::replace(&mut self.playhead, new);
        if old != new {
            self.fire(MovieEvent::Playhead { old, new });
        }
    }

    pub fn selection_start(&self) -> Rational {
        self.selection_start
    }

    pub fn set_selection_start(&mut self, new: Rational) {
        let old = std::mem::replace(&mut self.selection_start, new);
        if old != new {
            self.fire(MovieEvent::SelectionStart { old, new });
        }
    }

    pub fn selection_end(&self) -> Rational {
        self.selection_end
    }

    pub fn set_selection_end(&mut self, new: Rational) {
        let old = std::mem::replace(&mut self.selection_end, new);
        if old != new {
            self.fire(MovieEvent::SelectionEnd { old, new });
        }
    }

    /// Register a listener for model changes.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&MovieEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    fn fire(&mut self, event: MovieEvent) {
        trace!(?event, listeners = self.listeners.len(), "movie changed");
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecap_core::Buffer;
    use std::sync::{Arc, Mutex};

    struct FixedReader {
        duration: Rational,
    }

    impl MovieReader for FixedReader {
        fn file_format(&self) -> Format {
            Format::new()
        }
        fn track_count(&self) -> usize {
            0
        }
        fn format(&self, _track: usize) -> Option<&Format> {
            None
        }
        fn chunk_count(&self, track: usize) -> Result<usize> {
            Err(crate::traits::track_not_found(track))
        }
        fn time_scale(&self, track: usize) -> Result<Rational> {
            Err(crate::traits::track_not_found(track))
        }
        fn read(&mut self, track: usize, _buffer: &mut Buffer) -> Result<()> {
            Err(crate::traits::track_not_found(track))
        }
        fn next_track(&self) -> Option<usize> {
            None
        }
        fn movie_duration(&self) -> Rational {
            self.duration
        }
        fn invalidate_duration(&mut self) {}
        fn duration(&self, track: usize) -> Result<Rational> {
            Err(crate::traits::track_not_found(track))
        }
        fn time_to_sample(&self, track: usize, _time: Rational) -> Result<usize> {
            Err(crate::traits::track_not_found(track))
        }
        fn sample_to_time(&self, track: usize, _sample: usize) -> Result<Rational> {
            Err(crate::traits::track_not_found(track))
        }
        fn set_movie_read_time(&mut self, _time: Rational) {}
        fn read_time(&self, track: usize) -> Result<Rational> {
            Err(crate::traits::track_not_found(track))
        }
    }

    #[test]
    fn test_selection_defaults_to_whole_movie() {
        let movie = Movie::new(FixedReader {
            duration: Rational::new(10, 3),
        });
        assert_eq!(movie.selection_start(), Rational::ZERO);
        assert_eq!(movie.selection_end(), Rational::new(10, 3));
        assert_eq!(movie.playhead(), Rational::ZERO);
    }

    #[test]
    fn test_events_only_on_change() {
        let mut movie = Movie::new(FixedReader {
            duration: Rational::from_int(5),
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = movie.subscribe(move |e| sink.lock().unwrap().push(*e));

        movie.set_playhead(Rational::from_int(1));
        movie.set_playhead(Rational::from_int(1));
        movie.set_selection_end(Rational::from_int(4));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                MovieEvent::Playhead {
                    old: Rational::ZERO,
                    new: Rational::from_int(1)
                },
                MovieEvent::SelectionEnd {
                    old: Rational::from_int(5),
                    new: Rational::from_int(4)
                },
            ]
        );

        assert!(movie.unsubscribe(id));
        movie.set_selection_start(Rational::from_int(2));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(!movie.unsubscribe(id));
    }
}
