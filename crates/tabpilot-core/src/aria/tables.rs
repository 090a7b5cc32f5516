//! Role lookup data.
//!
//! Pure constant tables. The classifier receives a [`RoleTables`] reference
//! rather than reading globals, so alternative tables can be injected in tests.

/// Implicit-role and role-policy tables consulted by the classifier and walker.
#[derive(Debug)]
pub struct RoleTables {
    /// Tag name to implicit role for tags whose role does not depend on
    /// attributes.
    pub tags: &'static [(&'static str, &'static str)],
    /// `<input type>` to implicit role. Types not listed map to
    /// [`RoleTables::input_default`].
    pub input_types: &'static [(&'static str, Option<&'static str>)],
    pub input_default: &'static str,
    /// Roles always exposed in snapshots because agents act on them.
    pub interactive: &'static [&'static str],
    /// Roles exposed in snapshots because they give the page its shape.
    pub structural: &'static [&'static str],
    /// Roles whose accessible name comes from their text content.
    pub name_from_content: &'static [&'static str],
    pub checkable: &'static [&'static str],
    pub disableable: &'static [&'static str],
    pub expandable: &'static [&'static str],
    pub selectable: &'static [&'static str],
    pub leveled: &'static [&'static str],
}

impl RoleTables {
    pub const STANDARD: RoleTables = RoleTables {
        tags: &[
            ("article", "article"),
            ("aside", "complementary"),
            ("button", "button"),
            ("summary", "button"),
            ("datalist", "listbox"),
            ("details", "group"),
            ("fieldset", "group"),
            ("optgroup", "group"),
            ("dialog", "dialog"),
            ("figure", "figure"),
            ("footer", "contentinfo"),
            ("form", "form"),
            ("h1", "heading"),
            ("h2", "heading"),
            ("h3", "heading"),
            ("h4", "heading"),
            ("h5", "heading"),
            ("h6", "heading"),
            ("header", "banner"),
            ("hr", "separator"),
            ("li", "listitem"),
            ("main", "main"),
            ("menu", "list"),
            ("ol", "list"),
            ("ul", "list"),
            ("meter", "meter"),
            ("nav", "navigation"),
            ("option", "option"),
            ("output", "status"),
            ("progress", "progressbar"),
            ("search", "search"),
            ("section", "region"),
            ("table", "table"),
            ("thead", "rowgroup"),
            ("tbody", "rowgroup"),
            ("tfoot", "rowgroup"),
            ("tr", "row"),
            ("td", "cell"),
            ("th", "columnheader"),
            ("textarea", "textbox"),
        ],
        input_types: &[
            ("button", Some("button")),
            ("submit", Some("button")),
            ("reset", Some("button")),
            ("image", Some("button")),
            ("checkbox", Some("checkbox")),
            ("radio", Some("radio")),
            ("text", Some("textbox")),
            ("email", Some("textbox")),
            ("password", Some("textbox")),
            ("tel", Some("textbox")),
            ("url", Some("textbox")),
            ("search", Some("searchbox")),
            ("number", Some("spinbutton")),
            ("range", Some("slider")),
            ("hidden", None),
        ],
        input_default: "textbox",
        interactive: &[
            "button",
            "link",
            "textbox",
            "checkbox",
            "radio",
            "combobox",
            "searchbox",
            "slider",
            "spinbutton",
            "menuitem",
            "menuitemcheckbox",
            "menuitemradio",
            "tab",
            "switch",
            "option",
            "treeitem",
        ],
        structural: &[
            "heading",
            "navigation",
            "main",
            "banner",
            "contentinfo",
            "complementary",
            "region",
            "article",
            "form",
            "search",
        ],
        name_from_content: &["button", "link", "heading", "menuitem", "tab"],
        checkable: &[
            "checkbox",
            "radio",
            "switch",
            "menuitemcheckbox",
            "menuitemradio",
        ],
        disableable: &[
            "button",
            "link",
            "textbox",
            "searchbox",
            "checkbox",
            "radio",
            "combobox",
            "listbox",
            "option",
            "slider",
            "spinbutton",
            "switch",
            "menuitem",
            "menuitemcheckbox",
            "menuitemradio",
            "tab",
            "treeitem",
        ],
        expandable: &["button", "link", "combobox", "menuitem", "tab", "treeitem", "row"],
        selectable: &["option", "tab", "treeitem", "row", "gridcell"],
        leveled: &["heading", "treeitem"],
    };

    pub fn tag_role(&self, tag: &str) -> Option<&'static str> {
        self.tags.iter().find(|(t, _)| *t == tag).map(|(_, r)| *r)
    }

    pub fn input_role(&self, input_type: &str) -> Option<&'static str> {
        let input_type = input_type.trim().to_ascii_lowercase();
        match self.input_types.iter().find(|(t, _)| *t == input_type) {
            Some((_, role)) => *role,
            None => Some(self.input_default),
        }
    }
}
