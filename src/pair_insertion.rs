use {
    crate::*,
    derive_deref::{Deref, DerefMut},
    nom::{
        bytes::complete::{tag, take_while_m_n},
        combinator::{all_consuming, map},
        sequence::separated_pair,
        IResult,
    },
    static_assertions::const_assert,
    std::{collections::HashMap, ops::AddAssign},
};

// Element counts after 40 steps exceed `u32::MAX`
const_assert!(usize::BITS >= u64::BITS);

#[cfg_attr(test, derive(Debug))]
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
#[repr(transparent)]
struct ElementIndex(u8);

impl From<usize> for ElementIndex {
    fn from(element_index: usize) -> Self {
        ElementIndex(element_index as u8)
    }
}

impl From<ElementIndex> for usize {
    fn from(element_index: ElementIndex) -> Self {
        element_index.0 as usize
    }
}

#[cfg_attr(test, derive(Debug, PartialEq))]
#[derive(Clone, Default, Deref, DerefMut)]
#[repr(transparent)]
struct Polymer(Vec<ElementIndex>);

/// Counts of elements inserted (or initially present), indexed by `ElementIndex`. An element is
/// present in the mapping iff its count is non-zero.
#[cfg_attr(test, derive(Debug, PartialEq))]
#[derive(Clone, Deref, DerefMut)]
#[repr(transparent)]
struct ElementCounts(Vec<usize>);

impl ElementCounts {
    fn new(num_elements: usize) -> Self {
        Self(vec![0_usize; num_elements])
    }

    fn count(&self, element_index: ElementIndex) -> usize {
        self.0[usize::from(element_index)]
    }

    fn count_mut(&mut self, element_index: ElementIndex) -> &mut usize {
        &mut self.0[usize::from(element_index)]
    }

    fn total(&self) -> usize {
        self.iter().sum()
    }
}

impl AddAssign<&ElementCounts> for ElementCounts {
    fn add_assign(&mut self, rhs: &ElementCounts) {
        for (count, rhs_count) in self.iter_mut().zip(rhs.iter().copied()) {
            *count += rhs_count;
        }
    }
}

#[cfg_attr(test, derive(PartialEq))]
#[derive(Debug, Default, Deref, DerefMut)]
#[repr(transparent)]
pub struct ElementFrequencies(Vec<(char, usize)>);

#[derive(Debug, PartialEq)]
pub enum ParseSolutionError<'s> {
    EmptyPolymerTemplate,
    MalformedPolymerTemplate(&'s str),
    MalformedRule(&'s str),
    TooManyElements(&'s str),
}

#[derive(Debug, PartialEq)]
pub struct EmptyElementCountsError;

type Pair = [u8; Solution::PAIR_SIZE];

/// Key for one memoized pair expansion: the boundary elements and the remaining step count
type ExpansionKey = (ElementIndex, ElementIndex, usize);

#[cfg_attr(test, derive(Debug, PartialEq))]
#[derive(Default)]
pub struct Solution {
    elements: Vec<char>,
    polymer_template: Polymer,
    rules: Vec<Option<ElementIndex>>,
    expansion_cache: HashMap<ExpansionKey, ElementCounts>,
    rule_applications: usize,
}

impl Solution {
    const PAIR_SIZE: usize = 2_usize;
    const MAX_ELEMENTS_LEN: usize = 1_usize << u8::BITS;
    const Q1_STEPS: usize = 10_usize;
    const Q2_STEPS: usize = 40_usize;

    fn is_ascii_uppercase(c: char) -> bool {
        c.is_ascii_uppercase()
    }

    fn first_byte(input: &str) -> u8 {
        input.as_bytes()[0_usize]
    }

    fn pair_from_valid_str(input: &str) -> Pair {
        let mut pair: Pair = Pair::default();

        pair.clone_from_slice(input.as_bytes());

        pair
    }

    fn parse_element<'i>(input: &'i str) -> IResult<&'i str, u8> {
        map(
            take_while_m_n(1_usize, 1_usize, Self::is_ascii_uppercase),
            Self::first_byte,
        )(input)
    }

    fn parse_pair_insertion_rule<'i>(input: &'i str) -> IResult<&'i str, (Pair, u8)> {
        all_consuming(separated_pair(
            map(
                take_while_m_n(Self::PAIR_SIZE, Self::PAIR_SIZE, Self::is_ascii_uppercase),
                Self::pair_from_valid_str,
            ),
            tag(" -> "),
            Self::parse_element,
        ))(input)
    }

    #[inline(always)]
    fn num_elements(&self) -> usize {
        self.elements.len()
    }

    fn try_get_element_index(elements: &[char], element: u8) -> Option<ElementIndex> {
        let element: char = element as char;

        elements
            .iter()
            .position(|existing_element| *existing_element == element)
            .map(From::from)
    }

    fn try_get_or_add_element_index(&mut self, element: u8) -> Option<ElementIndex> {
        if let Some(element_index) = Self::try_get_element_index(&self.elements, element) {
            Some(element_index)
        } else if self.num_elements() < Self::MAX_ELEMENTS_LEN {
            let element_index: ElementIndex = self.num_elements().into();

            self.elements.push(element as char);

            Some(element_index)
        } else {
            None
        }
    }

    #[inline(always)]
    fn rule_index_from_elements(
        num_elements: usize,
        left_element_index: ElementIndex,
        right_element_index: ElementIndex,
    ) -> usize {
        usize::from(left_element_index) * num_elements + usize::from(right_element_index)
    }

    #[inline(always)]
    fn rule_index(
        &self,
        left_element_index: ElementIndex,
        right_element_index: ElementIndex,
    ) -> usize {
        Self::rule_index_from_elements(self.num_elements(), left_element_index, right_element_index)
    }

    /// Counts the elements inserted by expanding the pair (left, right) for `remaining_steps`
    /// generations, excluding the two boundary elements.
    ///
    /// An inserted element is counted once in the generation introducing it, and the insertions it
    /// transitively produces over the remaining generations are counted too. A pair with no
    /// matching rule contributes nothing, exactly as a pair with no remaining steps. Computed
    /// results are cached by (left, right, remaining): without the cache the recursion is
    /// exponential in the step count, with it the work is bounded by
    /// `num_elements² * (steps + 1)`.
    fn expand_insertions(
        &mut self,
        left_element_index: ElementIndex,
        right_element_index: ElementIndex,
        remaining_steps: usize,
    ) -> ElementCounts {
        if remaining_steps == 0_usize {
            return ElementCounts::new(self.num_elements());
        }

        let mid_element_index: ElementIndex =
            match self.rules[self.rule_index(left_element_index, right_element_index)] {
                None => return ElementCounts::new(self.num_elements()),
                Some(mid_element_index) => mid_element_index,
            };

        let expansion_key: ExpansionKey =
            (left_element_index, right_element_index, remaining_steps);

        if let Some(element_counts) = self.expansion_cache.get(&expansion_key) {
            return element_counts.clone();
        }

        let mut element_counts: ElementCounts = self.expand_insertions(
            left_element_index,
            mid_element_index,
            remaining_steps - 1_usize,
        );

        element_counts += &self.expand_insertions(
            mid_element_index,
            right_element_index,
            remaining_steps - 1_usize,
        );
        *element_counts.count_mut(mid_element_index) += 1_usize;
        self.rule_applications += 1_usize;
        self.expansion_cache
            .insert(expansion_key, element_counts.clone());

        element_counts
    }

    /// Counts all elements present after running the pair insertion process on the template for
    /// `steps` generations.
    ///
    /// The template's own elements are seeded first, one count per occurrence, so each boundary
    /// element is counted exactly once regardless of how many pair expansions share it.
    fn element_counts_after_steps(&mut self, steps: usize) -> ElementCounts {
        let mut element_counts: ElementCounts = ElementCounts::new(self.num_elements());

        for index in 0_usize..self.polymer_template.len() {
            *element_counts.count_mut(self.polymer_template[index]) += 1_usize;
        }

        for pair_index in 0_usize..self.polymer_template.len().saturating_sub(1_usize) {
            let left_element_index: ElementIndex = self.polymer_template[pair_index];
            let right_element_index: ElementIndex = self.polymer_template[pair_index + 1_usize];

            element_counts +=
                &self.expand_insertions(left_element_index, right_element_index, steps);
        }

        element_counts
    }

    /// Most frequent count minus least frequent count, over the elements actually present
    fn element_count_range(
        element_counts: &ElementCounts,
    ) -> Result<usize, EmptyElementCountsError> {
        let (min, max): (usize, usize) = element_counts
            .iter()
            .copied()
            .filter(|count| *count != 0_usize)
            .fold((usize::MAX, usize::MIN), |(min, max), count| {
                (min.min(count), max.max(count))
            });

        if max == usize::MIN {
            Err(EmptyElementCountsError)
        } else {
            Ok(max - min)
        }
    }

    /// The present elements and their counts, most frequent first, ties by ascending element
    fn sorted_element_frequencies(&self, element_counts: &ElementCounts) -> ElementFrequencies {
        let mut element_frequencies: ElementFrequencies = ElementFrequencies(
            self.elements
                .iter()
                .copied()
                .zip(element_counts.iter().copied())
                .filter(|(_, count)| *count != 0_usize)
                .collect(),
        );

        element_frequencies.sort_by(|&(element_a, count_a), &(element_b, count_b)| {
            count_a
                .cmp(&count_b)
                .reverse()
                .then_with(|| element_a.cmp(&element_b))
        });

        element_frequencies
    }

    fn print_element_count_range_after_steps(&mut self, steps: usize, verbose: bool) {
        let element_counts: ElementCounts = self.element_counts_after_steps(steps);

        match Self::element_count_range(&element_counts) {
            Ok(element_count_range) => {
                if verbose {
                    let element_frequencies: ElementFrequencies =
                        self.sorted_element_frequencies(&element_counts);
                    let rule_applications: usize = self.rule_applications;
                    let cached_expansions: usize = self.expansion_cache.len();

                    dbg!(
                        element_count_range,
                        element_frequencies,
                        rule_applications,
                        cached_expansions
                    );
                } else {
                    dbg!(element_count_range);
                }
            }
            Err(error) => {
                eprintln!("Failed to compute element count range after {steps} steps:\n{error:?}");
            }
        }
    }
}

impl RunQuestions for Solution {
    fn q1_internal(&mut self, args: &QuestionArgs) {
        self.print_element_count_range_after_steps(
            args.steps.unwrap_or(Self::Q1_STEPS),
            args.verbose,
        );
    }

    fn q2_internal(&mut self, args: &QuestionArgs) {
        self.print_element_count_range_after_steps(
            args.steps.unwrap_or(Self::Q2_STEPS),
            args.verbose,
        );
    }
}

impl<'i> TryFrom<&'i str> for Solution {
    type Error = ParseSolutionError<'i>;

    fn try_from(input: &'i str) -> Result<Self, Self::Error> {
        use ParseSolutionError as Error;

        let mut solution: Self = Self::default();
        let mut lines = input.trim_end().lines().skip_while(|line| line.is_empty());

        let polymer_template_line: &str = lines.next().ok_or(Error::EmptyPolymerTemplate)?;

        if !polymer_template_line.chars().all(Self::is_ascii_uppercase) {
            return Err(Error::MalformedPolymerTemplate(polymer_template_line));
        }

        for element in polymer_template_line.bytes() {
            let element_index: ElementIndex = solution
                .try_get_or_add_element_index(element)
                .ok_or(Error::TooManyElements(polymer_template_line))?;

            solution.polymer_template.push(element_index);
        }

        match lines.next() {
            None | Some("") => {}
            Some(line) => return Err(Error::MalformedRule(line)),
        }

        // The rule list indices depend on the total number of elements, so intern everything
        // before building the list
        let mut pair_insertion_rules: Vec<(Pair, u8)> = Vec::new();

        for line in lines {
            let (_, pair_insertion_rule): (&str, (Pair, u8)) =
                Self::parse_pair_insertion_rule(line).map_err(|_| Error::MalformedRule(line))?;

            let ([left_element, right_element], mid_element) = pair_insertion_rule;

            for element in [left_element, right_element, mid_element] {
                solution
                    .try_get_or_add_element_index(element)
                    .ok_or(Error::TooManyElements(line))?;
            }

            pair_insertion_rules.push(pair_insertion_rule);
        }

        let num_elements: usize = solution.num_elements();
        let get_index =
            |element: u8| Self::try_get_element_index(&solution.elements, element).unwrap();

        let mut rules: Vec<Option<ElementIndex>> = vec![None; num_elements * num_elements];

        for ([left_element, right_element], mid_element) in pair_insertion_rules {
            rules[Self::rule_index_from_elements(
                num_elements,
                get_index(left_element),
                get_index(right_element),
            )] = Some(get_index(mid_element));
        }

        solution.rules = rules;

        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLUTION_1_STR: &str = concat!(
        "NNCB\n",
        "\n",
        "CH -> B\n",
        "HH -> N\n",
        "CB -> H\n",
        "NH -> C\n",
        "HB -> C\n",
        "HC -> B\n",
        "HN -> C\n",
        "NN -> C\n",
        "BH -> H\n",
        "NC -> B\n",
        "NB -> B\n",
        "BN -> B\n",
        "BB -> N\n",
        "BC -> B\n",
        "CC -> N\n",
        "CN -> C\n",
    );

    const SOLUTION_2_STR: &str = "\
        AABBA\n\
        \n\
        AA -> A\n\
        AB -> A\n\
        BA -> B\n";

    const SOLUTION_3_STR: &str = "\
        ABC\n\
        \n\
        AB -> C\n\
        BC -> A\n\
        CA -> B\n";

    macro_rules! polymer { [ $( $element_index:expr ),* $(,)? ] => {
        Polymer(vec![ $( ElementIndex($element_index), )* ])
    } }

    macro_rules! element_counts { [ $( $count:expr ),* $(,)? ] => {
        ElementCounts(vec![ $( $count, )* ])
    } }

    macro_rules! solution {
        {
            [ $( $element:expr ),* $(,)? ],
            [ $( $element_index:expr ),* $(,)? ],
            [ $( $rule:expr ),* $(,)? ]
        } => {
            Solution {
                elements: vec![ $( $element, )* ],
                polymer_template: polymer![ $( $element_index, )* ],
                rules: vec![ $( $rule, )* ]
                    .into_iter()
                    .map(|rule: Option<u8>| rule.map(ElementIndex))
                    .collect(),
                ..Solution::default()
            }
        };
    }

    fn solution_1() -> Solution {
        solution! {
            ['N', 'C', 'B', 'H'],
            [0, 0, 1, 2],
            [
                Some(1), Some(2), Some(2), Some(1),
                Some(1), Some(0), Some(3), Some(2),
                Some(2), Some(2), Some(0), Some(3),
                Some(1), Some(2), Some(1), Some(0),
            ]
        }
    }

    fn solution_2() -> Solution {
        solution! {
            ['A', 'B'],
            [0, 0, 1, 1, 0],
            [Some(0), Some(0), Some(1), None]
        }
    }

    fn solution_3() -> Solution {
        solution! {
            ['A', 'B', 'C'],
            [0, 1, 2],
            [
                None, Some(2), None,
                None, None, Some(0),
                Some(1), None, None,
            ]
        }
    }

    #[test]
    fn test_try_from_str() {
        assert_eq!(Solution::try_from(SOLUTION_1_STR), Ok(solution_1()));
        assert_eq!(Solution::try_from(SOLUTION_2_STR), Ok(solution_2()));
        assert_eq!(Solution::try_from(SOLUTION_3_STR), Ok(solution_3()));
        assert_eq!(
            Solution::try_from("NNCB"),
            Ok(solution! {
                ['N', 'C', 'B'],
                [0, 0, 1, 2],
                [None, None, None, None, None, None, None, None, None]
            })
        );
    }

    #[test]
    fn test_try_from_malformed_str() {
        use ParseSolutionError as Error;

        assert_eq!(Solution::try_from(""), Err(Error::EmptyPolymerTemplate));
        assert_eq!(Solution::try_from("\n\n"), Err(Error::EmptyPolymerTemplate));
        assert_eq!(
            Solution::try_from("NnCB\n\nNN -> C\n"),
            Err(Error::MalformedPolymerTemplate("NnCB"))
        );
        assert_eq!(
            Solution::try_from("NNCB\nNN -> C\n"),
            Err(Error::MalformedRule("NN -> C"))
        );
        assert_eq!(
            Solution::try_from("NNCB\n\nN -> C\n"),
            Err(Error::MalformedRule("N -> C"))
        );
        assert_eq!(
            Solution::try_from("NNCB\n\nNNC -> B\n"),
            Err(Error::MalformedRule("NNC -> B"))
        );
        assert_eq!(
            Solution::try_from("NNCB\n\nNN -> CB\n"),
            Err(Error::MalformedRule("NN -> CB"))
        );
        assert_eq!(
            Solution::try_from("NNCB\n\nNN > C\n"),
            Err(Error::MalformedRule("NN > C"))
        );
        assert_eq!(
            Solution::try_from("NNCB\n\nnn -> c\n"),
            Err(Error::MalformedRule("nn -> c"))
        );
        assert_eq!(
            Solution::try_from("NNCB\n\nNN -> C\n\nCC -> N\n"),
            Err(Error::MalformedRule(""))
        );
    }

    #[test]
    fn test_element_counts_after_zero_steps() {
        let mut solution: Solution = solution_1();
        let element_counts: ElementCounts = solution.element_counts_after_steps(0_usize);

        assert_eq!(element_counts, element_counts![2, 1, 1, 0]);
        assert_eq!(element_counts.total(), 4_usize);
    }

    #[test]
    fn test_element_counts_after_known_steps() {
        let mut solution: Solution = solution_1();
        let element_counts: ElementCounts =
            solution.element_counts_after_steps(Solution::Q1_STEPS);

        assert_eq!(element_counts.total(), 3073_usize);
        assert_eq!(element_counts, element_counts![865, 298, 1749, 161]);
        assert_eq!(
            Solution::element_count_range(&element_counts),
            Ok(1588_usize)
        );

        let element_counts: ElementCounts =
            solution.element_counts_after_steps(Solution::Q2_STEPS);

        assert_eq!(
            element_counts.count(ElementIndex(2_u8)),
            2_192_039_569_602_usize
        );
        assert_eq!(element_counts.count(ElementIndex(3_u8)), 3_849_876_073_usize);
        assert_eq!(
            Solution::element_count_range(&element_counts),
            Ok(2_188_189_693_529_usize)
        );
    }

    #[test]
    fn test_element_count_totals_are_non_decreasing() {
        let mut solution: Solution = solution_1();
        let mut previous_total: usize = 0_usize;

        for steps in 0_usize..=12_usize {
            let total: usize = solution.element_counts_after_steps(steps).total();

            assert!(total >= previous_total, "steps: {steps}, total: {total}");

            previous_total = total;
        }
    }

    #[test]
    fn test_expansion_cache_reuse() {
        let mut solution: Solution = solution_1();
        let first_element_counts: ElementCounts = solution.expand_insertions(
            ElementIndex(0_u8),
            ElementIndex(0_u8),
            Solution::Q1_STEPS,
        );
        let rule_applications: usize = solution.rule_applications;

        assert_ne!(rule_applications, 0_usize);

        let second_element_counts: ElementCounts = solution.expand_insertions(
            ElementIndex(0_u8),
            ElementIndex(0_u8),
            Solution::Q1_STEPS,
        );

        assert_eq!(first_element_counts, second_element_counts);
        assert_eq!(solution.rule_applications, rule_applications);
    }

    #[test]
    fn test_unmatched_pair_expansion() {
        let mut solution: Solution = solution_2();
        let no_insertions: ElementCounts = ElementCounts::new(solution.num_elements());

        for remaining_steps in [0_usize, 1_usize, 5_usize, 40_usize] {
            assert_eq!(
                solution.expand_insertions(
                    ElementIndex(1_u8),
                    ElementIndex(1_u8),
                    remaining_steps
                ),
                no_insertions
            );
        }

        assert!(solution.expansion_cache.is_empty());
        assert_eq!(solution.rule_applications, 0_usize);
    }

    #[test]
    fn test_expansion_additivity() {
        let mut solution: Solution = solution_3();
        let steps: usize = 6_usize;
        let element_counts: ElementCounts = solution.element_counts_after_steps(steps);
        let mut expected_element_counts: ElementCounts = element_counts![1, 1, 1];

        expected_element_counts +=
            &solution.expand_insertions(ElementIndex(0_u8), ElementIndex(1_u8), steps);
        expected_element_counts +=
            &solution.expand_insertions(ElementIndex(1_u8), ElementIndex(2_u8), steps);

        assert_eq!(element_counts, expected_element_counts);
    }

    #[test]
    fn test_element_count_range() {
        assert_eq!(
            Solution::element_count_range(&element_counts![]),
            Err(EmptyElementCountsError)
        );
        assert_eq!(
            Solution::element_count_range(&element_counts![0, 0]),
            Err(EmptyElementCountsError)
        );
        assert_eq!(
            Solution::element_count_range(&element_counts![0, 7, 0]),
            Ok(0_usize)
        );
        assert_eq!(
            Solution::element_count_range(&element_counts![0, 5, 2, 1]),
            Ok(4_usize)
        );
    }

    #[test]
    fn test_sorted_element_frequencies() {
        let solution: Solution = solution_1();

        assert_eq!(
            solution.sorted_element_frequencies(&element_counts![2, 2, 1, 0]),
            ElementFrequencies(vec![('C', 2_usize), ('N', 2_usize), ('B', 1_usize)])
        );

        let mut solution: Solution = solution_1();
        let element_counts: ElementCounts =
            solution.element_counts_after_steps(Solution::Q1_STEPS);

        assert_eq!(
            solution.sorted_element_frequencies(&element_counts),
            ElementFrequencies(vec![
                ('B', 1749_usize),
                ('N', 865_usize),
                ('C', 298_usize),
                ('H', 161_usize),
            ])
        );
    }
}
