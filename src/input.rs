use unicode_width::UnicodeWidthStr;

/// Single-line text field with a cursor counted in chars.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InputField {
    value: String,
    character_index: usize,
}

impl InputField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.reset_cursor();
    }

    pub fn reset_cursor(&mut self) {
        self.character_index = 0;
    }

    pub fn move_cursor_left(&mut self) {
        let cursor_moved_left = self.character_index.saturating_sub(1);
        self.character_index = self.clamp_cursor(cursor_moved_left);
    }

    pub fn move_cursor_right(&mut self) {
        let cursor_moved_right = self.character_index.saturating_add(1);
        self.character_index = self.clamp_cursor(cursor_moved_right);
    }

    pub fn enter_char(&mut self, new_char: char) {
        let index = self.byte_index();
        self.value.insert(index, new_char);
        self.move_cursor_right();
    }

    pub fn enter_str(&mut self, text: &str) {
        for c in text.chars().filter(|c| !c.is_control()) {
            self.enter_char(c);
        }
    }

    /// Removes the char left of the cursor.
    pub fn delete_char(&mut self) {
        if self.character_index == 0 {
            return;
        }
        let current_index = self.character_index;
        let before = self.value.chars().take(current_index - 1);
        let after = self.value.chars().skip(current_index);
        self.value = before.chain(after).collect();
        self.move_cursor_left();
    }

    /// Terminal columns between the start of the field and the cursor.
    pub fn cursor_column(&self) -> u16 {
        let width = self.value[..self.byte_index()].width();
        u16::try_from(width).unwrap_or(u16::MAX)
    }

    fn byte_index(&self) -> usize {
        self.value
            .char_indices()
            .map(|(i, _)| i)
            .nth(self.character_index)
            .unwrap_or(self.value.len())
    }

    fn clamp_cursor(&self, new_cursor_pos: usize) -> usize {
        new_cursor_pos.clamp(0, self.value.chars().count())
    }
}
