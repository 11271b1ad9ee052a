//! The asset tasks.
//!
//! | task | reads | writes |
//! |---|---|---|
//! | `scss` | Sass entry | `<root>/<styles.out>/<stem>.css` |
//! | `css` | compiled stylesheet | `<stem>.min.css` |
//! | `markup` | `<markup.dir>/**/[!_]*.ejs` | `<root>/<rel>.html` |
//! | `includes` | `<markup.includes>/**/*.ejs` | `<root>/<rel>.inc` (production) |
//! | `bundle` | script entry and its imports | `<root>/<scripts.out>/<bundle>` |
//! | `minjs` | bundle | `<stem>.min.js` |
//! | `images` | `<images.dir>/**/*.{jpg,jpeg,png,gif,svg}` | `<root>/<images.out>/<rel>` |
//! | `json` | `<data.dir>/**/*.json` | `<root>/<data.out>/<rel>` |
//! | `clean` | | empties the clean root |

pub mod clean;
pub mod data;
pub mod images;
pub mod markup;
pub mod scripts;
pub mod styles;

pub use clean::CleanTask;
pub use data::JsonTask;
pub use images::{ImagesTask, IMAGE_EXTENSIONS};
pub use markup::{IncludesTask, MarkupTask};
pub use scripts::{BundleTask, MinifyJsTask};
pub use styles::{CssTask, ScssTask};
