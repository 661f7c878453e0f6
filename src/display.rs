use crate::types::Record;

/// The `LeadFormatter` struct turns records into a copy-friendly text block.
pub struct LeadFormatter<'a> {
    /// The records to be rendered, in display order.
    leads: &'a [Record],
    /// Whether fields holding the missing-value placeholder are shown.
    show_missing: bool,
}

impl<'a> LeadFormatter<'a> {
    /// Creates a new `LeadFormatter` over the given leads.
    ///
    /// # Arguments
    ///
    /// * `leads` - The records to be rendered.
    ///
    /// # Returns
    ///
    /// A new instance of `LeadFormatter`.
    pub fn new(leads: &'a [Record]) -> Self {
        Self {
            leads,
            show_missing: true,
        }
    }

    /// Hides fields the provider left empty.
    pub fn hide_missing(mut self) -> Self {
        self.show_missing = false;
        self
    }

    /// Builds the text block, one numbered section per lead.
    ///
    /// # Returns
    ///
    /// The formatted leads, or a short notice when there are none.
    pub fn build(&self) -> String {
        if self.leads.is_empty() {
            return String::from("No leads to display");
        }

        self.leads
            .iter()
            .enumerate()
            .map(|(i, lead)| self.format_lead(i + 1, lead))
            .collect()
    }

    fn format_lead(&self, number: usize, lead: &Record) -> String {
        let mut block = format!("🔹 Lead #{}\n", number);
        for (key, value) in lead.iter() {
            if !self.show_missing && value == crate::MISSING_VALUE {
                continue;
            }
            block.push_str(&format!("  • {}: {}\n", key, value));
        }
        block.push('\n');
        block
    }
}
