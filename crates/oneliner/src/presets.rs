//! Canned expression fragments spliced into the output program.

use crate::expressions::{Expr, LambdaParams, Param};

fn setattr(obj: Expr, attr: &str, value: Expr) -> Expr {
    Expr::call(Expr::name("setattr"), vec![obj, Expr::str_literal(attr), value])
}

fn one_param(name: &str) -> LambdaParams {
    LambdaParams {
        args: vec![Param::plain(name)],
        ..LambdaParams::default()
    }
}

/// The iterator adapter that makes `break` expressible inside a list
/// comprehension. Setting its `_break` attribute ends iteration on the
/// next `__next__` call:
///
/// ```python
/// name := type('name', (), {
///     '__init__': lambda self, it: [setattr(self, 'it', iter(it)),
///                                   setattr(self, '_break', False), None][-1],
///     '__iter__': lambda self: self,
///     '__next__': lambda self: next(iter([])) if self._break else next(self.it),
/// })
/// ```
#[must_use]
pub fn iter_wrapper(name: &str) -> Expr {
    let init = Expr::lambda(
        LambdaParams {
            args: vec![Param::plain("self"), Param::plain("it")],
            ..LambdaParams::default()
        },
        Expr::last_item(Expr::List(vec![
            setattr(
                Expr::name("self"),
                "it",
                Expr::call(Expr::name("iter"), vec![Expr::name("it")]),
            ),
            setattr(Expr::name("self"), "_break", Expr::bool_literal(false)),
            Expr::none(),
        ])),
    );
    let iter = Expr::lambda(one_param("self"), Expr::name("self"));
    // Raising StopIteration from a lambda takes a detour: next() on an
    // exhausted iterator.
    let next = Expr::lambda(
        one_param("self"),
        Expr::if_exp(
            Expr::attr(Expr::name("self"), "_break"),
            Expr::call(
                Expr::name("next"),
                vec![Expr::call(Expr::name("iter"), vec![Expr::List(vec![])])],
            ),
            Expr::call(Expr::name("next"), vec![Expr::attr(Expr::name("self"), "it")]),
        ),
    );

    Expr::named(
        name,
        Expr::call(
            Expr::name("type"),
            vec![
                Expr::str_literal(name),
                Expr::Tuple(vec![]),
                Expr::Dict {
                    keys: vec![
                        Some(Expr::str_literal("__init__")),
                        Some(Expr::str_literal("__iter__")),
                        Some(Expr::str_literal("__next__")),
                    ],
                    values: vec![init, iter, next],
                },
            ],
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_binds_the_given_name() {
        let expr = iter_wrapper("__ol_iter_wrapper_0");
        let Expr::Named { target, .. } = &expr else {
            panic!("expected a named expression, got {expr:?}");
        };
        assert_eq!(target, "__ol_iter_wrapper_0");
    }
}
