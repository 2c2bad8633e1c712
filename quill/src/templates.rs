//! HTML pages, rendered from Liquid templates embedded in the binary.
//!
//! Every page is rendered in two steps: the page template first, then the shared
//! layout around it. Values provided by users must go through the `escape` filter.
use serde::Serialize;
use std::collections::HashMap;

use crate::flash::FlashMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Login,
    SignUp,
    Dashboard,
    CreatePost,
    EditPost,
    Admin,
    NotFound,
    Error,
}

impl Page {
    const ALL: [Page; 8] = [
        Page::Login,
        Page::SignUp,
        Page::Dashboard,
        Page::CreatePost,
        Page::EditPost,
        Page::Admin,
        Page::NotFound,
        Page::Error,
    ];

    fn source(self) -> &'static str {
        match self {
            Page::Login => include_str!("../templates/login.liquid"),
            Page::SignUp => include_str!("../templates/sign_up.liquid"),
            Page::Dashboard => include_str!("../templates/dashboard.liquid"),
            Page::CreatePost => include_str!("../templates/create_post.liquid"),
            Page::EditPost => include_str!("../templates/edit_post.liquid"),
            Page::Admin => include_str!("../templates/admin.liquid"),
            Page::NotFound => include_str!("../templates/not_found.liquid"),
            Page::Error => include_str!("../templates/error.liquid"),
        }
    }

    /// The title shown in the browser tab.
    fn title(self) -> &'static str {
        match self {
            Page::Login => "Log in",
            Page::SignUp => "Sign up",
            Page::Dashboard => "Dashboard",
            Page::CreatePost => "New post",
            Page::EditPost => "Edit post",
            Page::Admin => "Administration",
            Page::NotFound => "Not found",
            Page::Error => "Error",
        }
    }
}

const LAYOUT: &str = include_str!("../templates/layout.liquid");

/// The page-independent values every page has access to.
#[derive(Debug, Default, Serialize)]
pub struct Chrome {
    pub flashes: Vec<FlashMessage>,
    pub csrf_token: String,
    pub logged_in: bool,
}

/// All templates, parsed once at startup.
pub struct Templates {
    layout: liquid::Template,
    pages: HashMap<Page, liquid::Template>,
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates").finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to parse the `{page:?}` template")]
    Parse {
        page: Option<Page>,
        #[source]
        source: liquid::Error,
    },
    #[error("Failed to render the `{page:?}` page")]
    Render {
        page: Page,
        #[source]
        source: liquid::Error,
    },
}

impl Templates {
    pub fn parse() -> Result<Self, TemplateError> {
        let parser = liquid::ParserBuilder::with_stdlib()
            .build()
            .map_err(|source| TemplateError::Parse { page: None, source })?;
        let layout = parser
            .parse(LAYOUT)
            .map_err(|source| TemplateError::Parse { page: None, source })?;
        let mut pages = HashMap::with_capacity(Page::ALL.len());
        for page in Page::ALL {
            let template = parser.parse(page.source()).map_err(|source| TemplateError::Parse {
                page: Some(page),
                source,
            })?;
            pages.insert(page, template);
        }
        Ok(Self { layout, pages })
    }

    /// Render `page` inside the shared layout.
    ///
    /// The page template sees `values` as `page`, next to the [`Chrome`] values.
    pub fn render<T>(&self, page: Page, values: &T, chrome: &Chrome) -> Result<String, TemplateError>
    where
        T: Serialize,
    {
        #[derive(Serialize)]
        struct PageGlobals<'a, T> {
            page: &'a T,
            csrf_token: &'a str,
        }

        #[derive(Serialize)]
        struct LayoutGlobals<'a> {
            title: &'static str,
            content: String,
            flashes: &'a [FlashMessage],
            logged_in: bool,
        }

        let render_error = |source| TemplateError::Render { page, source };
        // Every page is registered by `Templates::parse`.
        let Some(template) = self.pages.get(&page) else {
            return Err(render_error(liquid::Error::with_msg("Unknown page")));
        };
        let globals = liquid::to_object(&PageGlobals {
            page: values,
            csrf_token: &chrome.csrf_token,
        })
        .map_err(render_error)?;
        let content = template.render(&globals).map_err(render_error)?;

        let globals = liquid::to_object(&LayoutGlobals {
            title: page.title(),
            content,
            flashes: &chrome.flashes,
            logged_in: chrome.logged_in,
        })
        .map_err(render_error)?;
        self.layout.render(&globals).map_err(render_error)
    }
}
