use crate::{
    router::pattern::{split_url, Pattern, Segment},
    RegistrationError,
};
use std::{collections::HashMap, sync::Arc};

/// A node in the routing trie.
#[derive(Debug)]
struct RoutingNode<T> {
    /// Present iff this node is a leaf.
    leaf: Option<(Arc<Pattern>, T)>,
    /// Children keyed by literal segment.
    children: HashMap<String, RoutingNode<T>>,
    /// The child shared by every wildcard at this depth.
    wildcard: Option<Box<RoutingNode<T>>>,
}

impl<T> Default for RoutingNode<T> {
    fn default() -> Self {
        Self {
            leaf: None,
            children: HashMap::new(),
            wildcard: None,
        }
    }
}

impl<T> RoutingNode<T> {
    fn child_mut(&mut self, segment: &Segment) -> &mut Self {
        match segment {
            Segment::Literal(s) => self.children.entry(s.clone()).or_default(),
            Segment::Wildcard(_) => &mut **self.wildcard.get_or_insert_with(Default::default),
        }
    }

    /// Depth first, literal before wildcard. `matches` is left as it was
    /// found when this returns `None`.
    fn find<'a>(&'a self, segments: &[&str], matches: &mut Vec<String>) -> Option<&'a Self> {
        let Some((seg, rest)) = segments.split_first() else {
            return self.leaf.as_ref().map(|_| self);
        };

        if let Some(found) = self
            .children
            .get(*seg)
            .and_then(|child| child.find(rest, matches))
        {
            return Some(found);
        }

        let wildcard = self.wildcard.as_deref()?;
        matches.push((*seg).to_owned());
        let found = wildcard.find(rest, matches);
        if found.is_none() {
            matches.pop();
        }
        found
    }
}

/// A successful lookup in a [`RoutingTree`].
#[derive(Debug)]
pub(crate) struct Match<'a, T> {
    pub(crate) pattern: &'a Arc<Pattern>,
    pub(crate) value: &'a T,
    /// Wildcard values, left to right.
    pub(crate) matches: Vec<String>,
}

/// A trie from method and url segments to values.
///
/// Built during startup. Lookups take `&self` and never mutate.
#[derive(Debug)]
pub(crate) struct RoutingTree<T> {
    roots: HashMap<String, RoutingNode<T>>,
}

impl<T> Default for RoutingTree<T> {
    fn default() -> Self {
        Self {
            roots: HashMap::new(),
        }
    }
}

impl<T> RoutingTree<T> {
    /// Insert a value at the leaf for `pattern`. Fails if that leaf is
    /// already occupied, leaving the existing value in place.
    pub(crate) fn insert(&mut self, pattern: Pattern, value: T) -> Result<(), RegistrationError> {
        let mut node = self.roots.entry(pattern.method().to_owned()).or_default();
        for segment in pattern.segments() {
            node = node.child_mut(segment);
        }

        if node.leaf.is_some() {
            return Err(RegistrationError::route_already_registered(
                pattern.method(),
                pattern.url(),
            ));
        }
        node.leaf = Some((Arc::new(pattern), value));
        Ok(())
    }

    /// Find the value registered for `method` and `url`.
    pub(crate) fn at(&self, method: &str, url: &str) -> Option<Match<'_, T>> {
        if method.is_empty() || url.is_empty() {
            return None;
        }
        let segments: Vec<&str> = split_url(url).collect();

        let mut matches = Vec::new();
        let node = self.roots.get(method)?.find(&segments, &mut matches)?;
        let (pattern, value) = node.leaf.as_ref()?;

        Some(Match {
            pattern,
            value,
            matches,
        })
    }

    /// Number of registered values.
    pub(crate) fn len(&self) -> usize {
        fn count<T>(node: &RoutingNode<T>) -> usize {
            usize::from(node.leaf.is_some())
                + node.children.values().map(count).sum::<usize>()
                + node.wildcard.as_deref().map(count).unwrap_or_default()
        }
        self.roots.values().map(count).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tree(routes: &[(&str, &str)]) -> RoutingTree<usize> {
        let mut tree = RoutingTree::default();
        for (i, (method, url)) in routes.iter().enumerate() {
            tree.insert(Pattern::parse(method, url).unwrap(), i).unwrap();
        }
        tree
    }

    #[track_caller]
    fn assert_match(tree: &RoutingTree<usize>, method: &str, url: &str, idx: usize, m: &[&str]) {
        let found = tree.at(method, url).unwrap();
        assert_eq!(*found.value, idx);
        assert_eq!(found.matches, m);
    }

    const ROUTES: &[(&str, &str)] = &[
        ("POST", "/{dist}/article/"),
        ("GET", "/user/{id}/description"),
        ("POST", "/{dist}/{articleId}/article/"),
        ("GET", "/user/hello"),
        ("GET", "/user/{id}"),
    ];

    #[test]
    fn matches_registered_routes() {
        let tree = tree(ROUTES);
        assert_eq!(tree.len(), ROUTES.len());

        assert_match(&tree, "GET", "/user/31231/description", 1, &["31231"]);
        assert_match(&tree, "POST", "/123/article", 0, &["123"]);
        assert_match(&tree, "POST", "/hi/123/article", 2, &["hi", "123"]);
    }

    #[test]
    fn literal_beats_wildcard() {
        let tree = tree(ROUTES);
        assert_match(&tree, "GET", "/user/hello", 3, &[]);
        assert_match(&tree, "GET", "/user/42", 4, &["42"]);

        let found = tree.at("GET", "/user/42").unwrap();
        assert_eq!(found.pattern.url(), "/user/{id}");
    }

    #[test]
    fn backtracks_out_of_literal_subtree() {
        let tree = tree(&[("GET", "/a/b/c"), ("GET", "/{x}/b/d")]);
        // "a" matches the literal child, which then dead ends at "d"
        assert_match(&tree, "GET", "/a/b/d", 1, &["a"]);
        assert_match(&tree, "GET", "/a/b/c", 0, &[]);
    }

    #[test]
    fn discards_matches_from_failed_wildcard_branch() {
        let tree = tree(&[("GET", "/a/{v}/x"), ("GET", "/{w}/b/y")]);
        // "b" is captured by {v} and then dropped when "y" fails to match "x"
        assert_match(&tree, "GET", "/a/b/y", 1, &["a"]);
        assert_match(&tree, "GET", "/a/b/x", 0, &["b"]);
    }

    #[test]
    fn no_match() {
        let tree = tree(ROUTES);
        assert!(tree.at("GET", "/user").is_none());
        assert!(tree.at("DELETE", "/user/hello").is_none());
        assert!(tree.at("GET", "/user/1/description/more").is_none());
        assert!(tree.at("", "/user/hello").is_none());
        assert!(tree.at("GET", "").is_none());
    }

    #[test]
    fn methods_are_separate() {
        let tree = tree(&[("GET", "/a"), ("POST", "/a")]);
        assert_match(&tree, "GET", "/a", 0, &[]);
        assert_match(&tree, "POST", "/a", 1, &[]);
    }

    #[test]
    fn empty_segments_are_literal() {
        let tree = tree(&[("GET", "/a//b")]);
        assert_match(&tree, "GET", "/a//b", 0, &[]);
        assert!(tree.at("GET", "/a/x/b").is_none());
    }

    #[test]
    fn duplicate_leaf_is_rejected() {
        let mut tree = tree(ROUTES);
        let err = tree
            .insert(Pattern::parse("POST", "/{dist}/article/").unwrap(), 99)
            .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::route_already_registered("POST", "/{dist}/article/")
        );

        // different wildcard names at the same depth share a leaf
        let err = tree
            .insert(Pattern::parse("GET", "/user/{name}").unwrap(), 99)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::RouteAlreadyRegistered { .. }));

        // the original registration survives
        assert_match(&tree, "GET", "/user/7", 4, &["7"]);
    }
}
