pub mod page_renderer;

pub use page_renderer::PageRenderer;
