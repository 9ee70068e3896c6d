use std::collections::VecDeque;

/// Bounded run-log transcript.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends an entry; multi-line entries are split into lines.
    pub fn push(
        &mut self,
        entry: &str,
    ) {
        for line in entry.lines() {
            if self.lines.len() == self.capacity {
                self.lines.pop_front();
            }
            self.lines.push_back(line.to_string());
        }
    }

    /// Replaces the transcript with a freshly fetched one.
    pub fn replace(
        &mut self,
        text: &str,
    ) {
        self.lines.clear();
        self.push(text);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn text(&self) -> String {
        self.lines().collect::<Vec<_>>().join("\n")
    }

    /// Lines containing `filter`, case-insensitive.
    pub fn filtered(
        &self,
        filter: &str,
    ) -> String {
        let needle = filter.to_lowercase();
        self.lines().filter(|line| line.to_lowercase().contains(&needle)).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod test {
    use super::LogBuffer;

    #[test]
    fn test_bounded_append() {
        let mut logs = LogBuffer::new(3);
        logs.push("one");
        logs.push("two\nthree");
        logs.push("four");

        assert_eq!(logs.len(), 3);
        assert_eq!(logs.text(), "two\nthree\nfour");
    }

    #[test]
    fn test_replace_and_filter() {
        let mut logs = LogBuffer::new(10);
        logs.push("stale");
        logs.replace("INFO start\nWARN slow tool\ninfo done");

        assert_eq!(logs.len(), 3);
        assert_eq!(logs.filtered("info"), "INFO start\ninfo done");
        assert_eq!(logs.filtered(""), logs.text());
        assert_eq!(logs.filtered("nothing"), "");
    }
}
