/// Editable text buffer backing one form input. Cursor columns count chars, not bytes.
#[derive(Debug, Clone)]
pub struct TextField {
    pub content: Vec<String>,
    pub cursor_row: usize,
    pub cursor_col: usize,
    pub scroll_offset: usize,
    pub multiline: bool,
    pub locked: bool,
    pub is_dirty: bool,
}

fn byte_index(line: &str, col: usize) -> usize {
    line.char_indices().nth(col).map(|(i, _)| i).unwrap_or(line.len())
}

fn char_len(line: &str) -> usize {
    line.chars().count()
}

impl TextField {
    pub fn single_line(value: &str) -> Self {
        Self::build(value, false)
    }

    pub fn multi_line(value: &str) -> Self {
        Self::build(value, true)
    }

    fn build(value: &str, multiline: bool) -> Self {
        let content: Vec<String> = if value.is_empty() {
            vec![String::new()]
        } else if multiline {
            value.split('\n').map(|s| s.to_string()).collect()
        } else {
            vec![value.replace('\n', " ")]
        };
        let cursor_row = content.len() - 1;
        let cursor_col = char_len(&content[cursor_row]);

        TextField {
            content,
            cursor_row,
            cursor_col,
            scroll_offset: 0,
            multiline,
            locked: false,
            is_dirty: false,
        }
    }

    /// A locked field ignores every edit.
    pub fn lock(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn insert_char(&mut self, c: char) {
        if self.locked {
            return;
        }
        if c == '\n' {
            self.insert_newline();
            return;
        }
        let line = &mut self.content[self.cursor_row];
        let at = byte_index(line, self.cursor_col);
        line.insert(at, c);
        self.cursor_col += 1;
        self.is_dirty = true;
    }

    pub fn insert_newline(&mut self) {
        if self.locked || !self.multiline {
            return;
        }
        let line = &mut self.content[self.cursor_row];
        let at = byte_index(line, self.cursor_col);
        let remaining = line.split_off(at);

        self.cursor_row += 1;
        self.cursor_col = 0;
        self.content.insert(self.cursor_row, remaining);
        self.is_dirty = true;
    }

    pub fn delete_char(&mut self) {
        if self.locked {
            return;
        }
        if self.cursor_col > 0 {
            let line = &mut self.content[self.cursor_row];
            let at = byte_index(line, self.cursor_col - 1);
            line.remove(at);
            self.cursor_col -= 1;
            self.is_dirty = true;
        } else if self.cursor_row > 0 {
            // Join with previous line
            let current_line = self.content.remove(self.cursor_row);
            self.cursor_row -= 1;
            self.cursor_col = char_len(&self.content[self.cursor_row]);
            self.content[self.cursor_row].push_str(&current_line);
            self.is_dirty = true;
        }
    }

    pub fn move_cursor_left(&mut self) {
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
        } else if self.cursor_row > 0 {
            self.cursor_row -= 1;
            self.cursor_col = char_len(&self.content[self.cursor_row]);
        }
    }

    pub fn move_cursor_right(&mut self) {
        let line_len = char_len(&self.content[self.cursor_row]);
        if self.cursor_col < line_len {
            self.cursor_col += 1;
        } else if self.cursor_row + 1 < self.content.len() {
            self.cursor_row += 1;
            self.cursor_col = 0;
        }
    }

    pub fn move_cursor_up(&mut self) {
        if self.cursor_row > 0 {
            self.cursor_row -= 1;
            self.cursor_col = self.cursor_col.min(char_len(&self.content[self.cursor_row]));
        }
    }

    pub fn move_cursor_down(&mut self) {
        if self.cursor_row + 1 < self.content.len() {
            self.cursor_row += 1;
            self.cursor_col = self.cursor_col.min(char_len(&self.content[self.cursor_row]));
        }
    }

    pub fn move_to_start_of_line(&mut self) {
        self.cursor_col = 0;
    }

    pub fn move_to_end_of_line(&mut self) {
        self.cursor_col = char_len(&self.content[self.cursor_row]);
    }

    /// Keeps the cursor row inside a window of `visible_height` lines.
    pub fn adjust_scroll_with_height(&mut self, visible_height: usize) {
        let visible_height = visible_height.max(1);
        if self.cursor_row < self.scroll_offset {
            self.scroll_offset = self.cursor_row;
        } else if self.cursor_row >= self.scroll_offset + visible_height {
            self.scroll_offset = self.cursor_row - visible_height + 1;
        }
    }

    pub fn value(&self) -> String {
        self.content.join("\n")
    }
}
